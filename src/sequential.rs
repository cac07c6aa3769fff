//! Sequential estimation: the position is first solved from ranging
//! measurements, then the transmitted power (and possibly the path loss
//! exponent) from RSSI measurements, at that position or starting from it.
use std::cell::Cell;

use log::{debug, info};
use nalgebra::{DMatrix, Point, SMatrix};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    apriori::Apriori,
    cfg::{Config, Measurements, Targets},
    error::Error,
    estimator::{
        pass::Pass, validate_initial_value, validate_quality_scores, validate_readings, Estimate,
        Listener, View,
    },
    power::{dbm_to_power, PathLoss},
    reading::Reading,
    robust::Event,
    source::LocatedRadioSource,
};

fn default_true() -> bool {
    true
}

/// [SequentialEstimator] configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SequentialConfig {
    /// [Config] of the ranging (position) pass
    #[cfg_attr(feature = "serde", serde(default))]
    pub ranging: Config,
    /// [Config] of the RSSI (power) pass
    #[cfg_attr(feature = "serde", serde(default))]
    pub rssi: Config,
    /// Estimate the transmitted power
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub transmitted_power_estimation: bool,
    /// Estimate the path loss exponent
    #[cfg_attr(feature = "serde", serde(default))]
    pub path_loss_estimation: bool,
    /// Estimate the position again during the RSSI pass, starting from
    /// the ranging position. Otherwise the RSSI pass keeps it fixed.
    #[cfg_attr(feature = "serde", serde(default))]
    pub rssi_position_estimation: bool,
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            ranging: Config::default(),
            rssi: Config::default(),
            transmitted_power_estimation: default_true(),
            path_loss_estimation: false,
            rssi_position_estimation: false,
        }
    }
}

impl SequentialConfig {
    /// Copies and returns [SequentialConfig] with this ranging pass [Config].
    pub fn with_ranging(&self, cfg: Config) -> Self {
        let mut s = self.clone();
        s.ranging = cfg;
        s
    }

    /// Copies and returns [SequentialConfig] with this RSSI pass [Config].
    pub fn with_rssi(&self, cfg: Config) -> Self {
        let mut s = self.clone();
        s.rssi = cfg;
        s
    }

    /// Copies and returns [SequentialConfig] with transmitted power estimation
    /// enabled or disabled.
    pub fn with_transmitted_power_estimation(&self, enabled: bool) -> Self {
        let mut s = self.clone();
        s.transmitted_power_estimation = enabled;
        s
    }

    /// Copies and returns [SequentialConfig] with path loss exponent estimation
    /// enabled or disabled.
    pub fn with_path_loss_estimation(&self, enabled: bool) -> Self {
        let mut s = self.clone();
        s.path_loss_estimation = enabled;
        s
    }

    /// Copies and returns [SequentialConfig] with position estimation
    /// during the RSSI pass enabled or disabled.
    pub fn with_rssi_position_estimation(&self, enabled: bool) -> Self {
        let mut s = self.clone();
        s.rssi_position_estimation = enabled;
        s
    }

    /// Returns true if the RSSI pass runs
    pub fn uses_rssi(&self) -> bool {
        self.transmitted_power_estimation
            || self.path_loss_estimation
            || self.rssi_position_estimation
    }

    /// [Targets] of the RSSI pass
    fn rssi_targets(&self) -> Targets {
        Targets {
            position: self.rssi_position_estimation,
            transmitted_power: self.transmitted_power_estimation,
            path_loss_exponent: self.path_loss_estimation,
        }
    }

    /// All estimated [Targets]
    fn targets(&self) -> Targets {
        self.rssi_targets().with_position(true)
    }
}

/// [SequentialEstimate] combines the ranging pass [Estimate]
/// and possibly the RSSI pass [Estimate].
#[derive(Debug, Clone, PartialEq)]
pub struct SequentialEstimate<const D: usize> {
    /// Ranging pass [Estimate]
    pub ranging: Estimate<D>,
    /// RSSI pass [Estimate], when power or path loss was estimated
    pub rssi: Option<Estimate<D>>,
}

impl<const D: usize> SequentialEstimate<D> {
    /// Estimated position, from the ranging pass
    pub fn position(&self) -> Point<f64, D> {
        self.ranging.position
    }

    /// Position estimated again by the RSSI pass, if it did
    pub fn rssi_position(&self) -> Option<Point<f64, D>> {
        self.rssi
            .as_ref()
            .filter(|e| e.targets.position)
            .map(|e| e.position)
    }

    /// Transmitted power (dBm)
    pub fn transmitted_power_dbm(&self) -> Option<f64> {
        self.rssi.as_ref().and_then(|e| e.transmitted_power_dbm)
    }

    /// Transmitted power (mW)
    pub fn transmitted_power_mw(&self) -> Option<f64> {
        self.transmitted_power_dbm().map(dbm_to_power)
    }

    /// Path loss exponent
    pub fn path_loss_exponent(&self) -> Option<f64> {
        self.rssi.as_ref().and_then(|e| e.path_loss_exponent)
    }

    /// Position covariance (m²), from the ranging pass
    pub fn position_covariance(&self) -> Option<SMatrix<f64, D, D>> {
        self.ranging.position_covariance()
    }

    /// Transmitted power variance (dBm²), from the RSSI pass
    pub fn transmitted_power_variance(&self) -> Option<f64> {
        self.rssi.as_ref().and_then(|e| e.transmitted_power_variance())
    }

    /// Path loss exponent variance, from the RSSI pass
    pub fn path_loss_exponent_variance(&self) -> Option<f64> {
        self.rssi.as_ref().and_then(|e| e.path_loss_exponent_variance())
    }

    /// Block diagonal covariance of `[position, power?, path loss?]`,
    /// when every block was estimated. The position block always comes
    /// from the ranging pass.
    pub fn covariance(&self) -> Option<DMatrix<f64>> {
        let position = self.ranging.covariance.matrix()?;

        // power and path loss block of the RSSI pass
        let rssi = match &self.rssi {
            Some(rssi) => {
                let matrix = rssi.covariance.matrix()?;
                let offset = if rssi.targets.position { D } else { 0 };
                let n = matrix.nrows().saturating_sub(offset);
                Some(matrix.view((offset, offset), (n, n)).into_owned())
            },
            None => None,
        };

        let n = rssi.as_ref().map(|m| m.nrows()).unwrap_or(0);

        let mut covariance = DMatrix::<f64>::zeros(D + n, D + n);

        covariance
            .view_mut((0, 0), (D, D))
            .copy_from(&position.view((0, 0), (D, D)));

        if let Some(rssi) = rssi {
            covariance.view_mut((D, D), (n, n)).copy_from(&rssi);
        }

        Some(covariance)
    }
}

/// [SequentialEstimator] solves the radio source position from ranging measurements,
/// then its transmitted power (and optionally the path loss exponent) from
/// RSSI measurements, the position being fixed unless
/// [SequentialConfig::rssi_position_estimation] is set.
pub struct SequentialEstimator<const D: usize> {
    cfg: SequentialConfig,
    readings: Vec<Reading<D>>,
    ranging_quality_scores: Option<Vec<f64>>,
    rssi_quality_scores: Option<Vec<f64>>,
    apriori: Apriori<D>,
    listener: Option<Box<dyn Listener<D>>>,
    locked: Cell<bool>,
    estimate: Option<SequentialEstimate<D>>,
}

/// Planar [SequentialEstimator]
pub type SequentialEstimator2D = SequentialEstimator<2>;

/// Spatial [SequentialEstimator]
pub type SequentialEstimator3D = SequentialEstimator<3>;

impl<const D: usize> std::fmt::Debug for SequentialEstimator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SequentialEstimator")
            .field("cfg", &self.cfg)
            .field("readings", &self.readings.len())
            .field("locked", &self.locked.get())
            .finish()
    }
}

impl<const D: usize> SequentialEstimator<D> {
    /// Builds a new [SequentialEstimator].
    pub fn new(cfg: SequentialConfig) -> Result<Self, Error> {
        Self::validate_config(&cfg)?;
        Ok(Self {
            cfg,
            readings: Vec::new(),
            ranging_quality_scores: None,
            rssi_quality_scores: None,
            apriori: Apriori::default(),
            listener: None,
            locked: Cell::new(false),
            estimate: None,
        })
    }

    fn validate_config(cfg: &SequentialConfig) -> Result<(), Error> {
        cfg.ranging
            .validate(Targets::position_only().min_readings(D))?;
        if cfg.uses_rssi() {
            cfg.rssi.validate(cfg.rssi_targets().min_readings(D))?;
        }
        Ok(())
    }

    fn check_unlocked(&self) -> Result<(), Error> {
        if self.locked.get() {
            Err(Error::Locked)
        } else {
            Ok(())
        }
    }

    /// [SequentialConfig] in use
    pub fn config(&self) -> &SequentialConfig {
        &self.cfg
    }

    /// Readings to process
    pub fn readings(&self) -> &[Reading<D>] {
        &self.readings
    }

    /// Ranging pass quality scores
    pub fn ranging_quality_scores(&self) -> Option<&[f64]> {
        self.ranging_quality_scores.as_deref()
    }

    /// RSSI pass quality scores
    pub fn rssi_quality_scores(&self) -> Option<&[f64]> {
        self.rssi_quality_scores.as_deref()
    }

    /// Initial position
    pub fn initial_position(&self) -> Option<Point<f64, D>> {
        self.apriori.position
    }

    /// Initial transmitted power (dBm)
    pub fn initial_transmitted_power_dbm(&self) -> Option<f64> {
        self.apriori.transmitted_power_dbm
    }

    /// Initial path loss exponent
    pub fn initial_path_loss_exponent(&self) -> Option<f64> {
        self.apriori.path_loss_exponent
    }

    /// Minimal number of readings
    pub fn min_readings(&self) -> usize {
        self.cfg.targets().min_readings(D)
    }

    /// Returns true while estimating
    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    /// Returns true if [Self::estimate] may be attempted
    pub fn is_ready(&self) -> bool {
        let size = self.readings.len();

        if size < self.min_readings() {
            return false;
        }

        let ranging_min = Targets::position_only().min_readings(D);
        if self.cfg.ranging.subset_size(ranging_min) > size {
            return false;
        }

        if self.readings.iter().any(|r| r.distance.is_none()) {
            return false;
        }

        let scores_ok = |cfg: &Config, scores: &Option<Vec<f64>>| {
            !cfg.method.requires_quality_scores()
                || matches!(scores, Some(scores) if scores.len() == size)
        };

        if !scores_ok(&self.cfg.ranging, &self.ranging_quality_scores) {
            return false;
        }

        if self.cfg.uses_rssi() {
            if self.readings.iter().any(|r| r.rssi.is_none()) {
                return false;
            }
            if !scores_ok(&self.cfg.rssi, &self.rssi_quality_scores) {
                return false;
            }
            let rssi_min = self.cfg.rssi_targets().min_readings(D);
            if self.cfg.rssi.subset_size(rssi_min) > size {
                return false;
            }
            if !self.cfg.transmitted_power_estimation
                && self.apriori.transmitted_power_dbm.is_none()
            {
                return false;
            }
        }

        true
    }

    /// Updates the [SequentialConfig]. Previous [SequentialConfig] is kept on error.
    pub fn set_config(&mut self, cfg: SequentialConfig) -> Result<(), Error> {
        self.check_unlocked()?;
        Self::validate_config(&cfg)?;
        self.cfg = cfg;
        Ok(())
    }

    /// Defines the readings to process. They must all carry ranging measurements,
    /// and RSSI measurements when power or path loss is estimated.
    pub fn set_readings(&mut self, readings: Vec<Reading<D>>) -> Result<(), Error> {
        self.check_unlocked()?;

        let min_readings = self.min_readings();
        if readings.len() < min_readings {
            return Err(Error::NotEnoughReadings(readings.len(), min_readings));
        }

        let measurements = if self.cfg.uses_rssi() {
            Measurements::RangingAndRssi
        } else {
            Measurements::Ranging
        };

        validate_readings(&readings, measurements)?;

        self.readings = readings;
        Ok(())
    }

    /// Defines the ranging pass quality scores. Has no effect unless
    /// the ranging pass method requires them.
    pub fn set_ranging_quality_scores(&mut self, scores: Vec<f64>) -> Result<(), Error> {
        self.check_unlocked()?;
        if !self.cfg.ranging.method.requires_quality_scores() {
            debug!("ranging {}: quality scores ignored", self.cfg.ranging.method);
            return Ok(());
        }
        validate_quality_scores(&scores, self.readings.len(), self.min_readings())?;
        self.ranging_quality_scores = Some(scores);
        Ok(())
    }

    /// Defines the RSSI pass quality scores. Has no effect unless
    /// the RSSI pass method requires them.
    pub fn set_rssi_quality_scores(&mut self, scores: Vec<f64>) -> Result<(), Error> {
        self.check_unlocked()?;
        if !self.cfg.rssi.method.requires_quality_scores() {
            debug!("rssi {}: quality scores ignored", self.cfg.rssi.method);
            return Ok(());
        }
        validate_quality_scores(&scores, self.readings.len(), self.min_readings())?;
        self.rssi_quality_scores = Some(scores);
        Ok(())
    }

    /// Defines (or clears) the initial position, that seeds the ranging refinement.
    pub fn set_initial_position(&mut self, position: Option<Point<f64, D>>) -> Result<(), Error> {
        self.check_unlocked()?;
        if let Some(position) = position {
            if position.iter().any(|x| !x.is_finite()) {
                return Err(Error::InvalidInitialValue);
            }
        }
        self.apriori.position = position;
        Ok(())
    }

    /// Defines (or clears) the initial transmitted power (dBm).
    /// Required when only the path loss exponent is estimated.
    pub fn set_initial_transmitted_power_dbm(&mut self, power: Option<f64>) -> Result<(), Error> {
        self.check_unlocked()?;
        validate_initial_value(power)?;
        self.apriori.transmitted_power_dbm = power;
        Ok(())
    }

    /// Defines (or clears) the initial path loss exponent.
    pub fn set_initial_path_loss_exponent(&mut self, exponent: Option<f64>) -> Result<(), Error> {
        self.check_unlocked()?;
        validate_initial_value(exponent)?;
        self.apriori.path_loss_exponent = exponent;
        Ok(())
    }

    /// Defines (or removes) the [Listener].
    pub fn set_listener(&mut self, listener: Option<Box<dyn Listener<D>>>) -> Result<(), Error> {
        self.check_unlocked()?;
        self.listener = listener;
        Ok(())
    }

    fn path_loss(&self) -> PathLoss {
        self.readings
            .first()
            .map(|r| r.source.path_loss())
            .unwrap_or_default()
    }

    /// Runs both passes. On success, the returned [SequentialEstimate] replaces
    /// the previous one. On failure, the previous one is preserved.
    pub fn estimate(&mut self) -> Result<SequentialEstimate<D>, Error> {
        self.check_unlocked()?;

        if !self.is_ready() {
            return Err(Error::NotReady);
        }

        self.locked.set(true);

        let mut listener = self.listener.take();
        let result = self.run(&mut listener);

        self.listener = listener;
        self.locked.set(false);

        let estimate = result?;

        info!(
            "sequential estimate: {} (power={:?} dBm, exponent={:?})",
            estimate.position(),
            estimate.transmitted_power_dbm(),
            estimate.path_loss_exponent(),
        );

        self.estimate = Some(estimate.clone());
        Ok(estimate)
    }

    fn run(
        &self,
        listener: &mut Option<Box<dyn Listener<D>>>,
    ) -> Result<SequentialEstimate<D>, Error> {
        let model = self.path_loss();
        let uses_rssi = self.cfg.uses_rssi();

        let ranging = Pass {
            readings: &self.readings,
            quality_scores: self.ranging_quality_scores.as_deref(),
            measurements: Measurements::Ranging,
            targets: Targets::position_only(),
            apriori: Apriori {
                position: self.apriori.position,
                ..Default::default()
            },
            cfg: &self.cfg.ranging,
            model,
        };

        let ranging_view = View {
            readings: &self.readings,
            cfg: &self.cfg.ranging,
            measurements: Measurements::Ranging,
            targets: Targets::position_only(),
            min_readings: self.min_readings(),
            locked: &self.locked,
        };

        if let Some(listener) = listener.as_mut() {
            listener.on_estimate_start(&ranging_view);
        }

        // progress share of the ranging pass
        let share = if uses_rssi { 0.5 } else { 1.0 };
        let mut iterations = 0;

        let ranging = ranging.run(&mut |event| {
            if let Event::NextIteration(_) = event {
                iterations += 1;
            }
            if let Some(listener) = listener.as_mut() {
                match event {
                    Event::NextIteration(iteration) => {
                        listener.on_estimate_next_iteration(&ranging_view, iteration)
                    },
                    Event::Progress(progress) => {
                        listener.on_estimate_progress_change(&ranging_view, progress * share)
                    },
                }
            }
        });

        let ranging = match ranging {
            Ok(ranging) => ranging,
            Err(e) => {
                if let Some(listener) = listener.as_mut() {
                    listener.on_estimate_end(&ranging_view);
                }
                return Err(e);
            },
        };

        if !uses_rssi {
            if let Some(listener) = listener.as_mut() {
                listener.on_estimate_end(&ranging_view);
            }
            return Ok(SequentialEstimate {
                ranging,
                rssi: None,
            });
        }

        debug!(
            "ranging pass: {} (rssi position estimation: {})",
            ranging.position, self.cfg.rssi_position_estimation
        );

        let rssi_targets = self.cfg.rssi_targets();

        let rssi = Pass {
            readings: &self.readings,
            quality_scores: self.rssi_quality_scores.as_deref(),
            measurements: Measurements::Rssi,
            targets: rssi_targets,
            apriori: Apriori {
                position: Some(ranging.position),
                transmitted_power_dbm: self.apriori.transmitted_power_dbm,
                path_loss_exponent: self.apriori.path_loss_exponent,
            },
            cfg: &self.cfg.rssi,
            model,
        };

        let rssi_view = View {
            readings: &self.readings,
            cfg: &self.cfg.rssi,
            measurements: Measurements::Rssi,
            targets: rssi_targets,
            min_readings: self.min_readings(),
            locked: &self.locked,
        };

        let rssi = rssi.run(&mut |event| {
            if let Some(listener) = listener.as_mut() {
                match event {
                    Event::NextIteration(iteration) => {
                        listener.on_estimate_next_iteration(&rssi_view, iterations + iteration)
                    },
                    Event::Progress(progress) => {
                        listener.on_estimate_progress_change(&rssi_view, 0.5 + 0.5 * progress)
                    },
                }
            }
        });

        if let Some(listener) = listener.as_mut() {
            listener.on_estimate_end(&rssi_view);
        }

        Ok(SequentialEstimate {
            ranging,
            rssi: Some(rssi?),
        })
    }

    /// Latest [SequentialEstimate]
    pub fn result(&self) -> Option<&SequentialEstimate<D>> {
        self.estimate.as_ref()
    }

    /// Latest estimated position
    pub fn estimated_position(&self) -> Option<Point<f64, D>> {
        self.estimate.as_ref().map(|e| e.position())
    }

    /// Latest estimated transmitted power (dBm)
    pub fn estimated_transmitted_power_dbm(&self) -> Option<f64> {
        self.estimate
            .as_ref()
            .and_then(|e| e.transmitted_power_dbm())
    }

    /// Latest estimated path loss exponent
    pub fn estimated_path_loss_exponent(&self) -> Option<f64> {
        self.estimate.as_ref().and_then(|e| e.path_loss_exponent())
    }

    /// Latest block diagonal covariance
    pub fn estimated_covariance(&self) -> Option<DMatrix<f64>> {
        self.estimate.as_ref().and_then(|e| e.covariance())
    }

    /// Latest estimate attached to the radio source being measured
    pub fn radio_source(&self) -> Option<LocatedRadioSource<D>> {
        let estimate = self.estimate.as_ref()?;
        let reading = self.readings.first()?;

        let mut located = reading.source.locate(&estimate.ranging);
        if let Some(rssi) = &estimate.rssi {
            located.transmitted_power_dbm = rssi.transmitted_power_dbm;
            located.path_loss_exponent = rssi.path_loss_exponent;
            located.transmitted_power_variance = rssi.transmitted_power_variance();
            located.path_loss_exponent_variance = rssi.path_loss_exponent_variance();
        }
        Some(located)
    }
}
