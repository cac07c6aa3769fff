//! Robust radio source [Estimator]
use std::cell::Cell;

use log::{debug, info};
use nalgebra::{DMatrix, Point, SMatrix};

use crate::{
    apriori::Apriori,
    cfg::{Config, Measurements, Targets},
    error::Error,
    power::PathLoss,
    reading::Reading,
    robust::{Event, InliersData},
    source::LocatedRadioSource,
};

mod listener;
mod result;

pub(crate) mod pass;

pub use listener::{Listener, View};
pub use result::{Covariance, Estimate};

use pass::Pass;

/// Verifies a set of [Reading]s: each must carry the requested [Measurements],
/// and they must all relate to the same radio source.
pub(crate) fn validate_readings<const D: usize>(
    readings: &[Reading<D>],
    measurements: Measurements,
) -> Result<(), Error> {
    for (index, reading) in readings.iter().enumerate() {
        reading.validate(index, measurements)?;
    }

    if let Some(first) = readings.first() {
        if readings.iter().any(|r| r.source != first.source) {
            return Err(Error::MixedRadioSources);
        }
    }

    Ok(())
}

/// Verifies quality scores (higher is better): one per reading,
/// once readings are defined.
pub(crate) fn validate_quality_scores(
    scores: &[f64],
    num_readings: usize,
    min_readings: usize,
) -> Result<(), Error> {
    if scores.len() < min_readings || scores.iter().any(|s| !s.is_finite()) {
        return Err(Error::QualityScoresLength);
    }
    if num_readings > 0 && scores.len() != num_readings {
        return Err(Error::QualityScoresLength);
    }
    Ok(())
}

pub(crate) fn validate_initial_value(value: Option<f64>) -> Result<(), Error> {
    match value {
        Some(value) if !value.is_finite() => Err(Error::InvalidInitialValue),
        _ => Ok(()),
    }
}

/// Robust radio source [Estimator]. Solves the position of a radio source
/// and, when using RSSI [Measurements], its transmitted power and path loss exponent,
/// from a set of [Reading]s that may contain outliers.
///
/// ```
/// use rf_locate::prelude::*;
///
/// let ap = RadioSource::wifi_access_point("00:11:22:33:44:55", 2_412_000_000);
/// let source = Point2::new(12.3, -7.8);
///
/// let readings = (0..20)
///     .map(|i| {
///         let angle = i as f64 * 0.3;
///         let sensor = Point2::new(10.0 * angle.cos(), 10.0 * angle.sin() + i as f64);
///         Reading2D::ranging(ap.clone(), sensor, (sensor - source).norm())
///     })
///     .collect::<Vec<_>>();
///
/// let mut estimator = Estimator2D::ranging(Config::with_method(RobustMethod::LMedS)).unwrap();
/// estimator.set_readings(readings).unwrap();
///
/// let estimate = estimator.estimate().unwrap();
/// assert!((estimate.position - source).norm() < 1e-6);
/// ```
pub struct Estimator<const D: usize> {
    cfg: Config,
    measurements: Measurements,
    targets: Targets,
    readings: Vec<Reading<D>>,
    quality_scores: Option<Vec<f64>>,
    apriori: Apriori<D>,
    listener: Option<Box<dyn Listener<D>>>,
    locked: Cell<bool>,
    estimate: Option<Estimate<D>>,
}

/// Planar [Estimator]
pub type Estimator2D = Estimator<2>;

/// Spatial [Estimator]
pub type Estimator3D = Estimator<3>;

impl<const D: usize> std::fmt::Debug for Estimator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Estimator")
            .field("cfg", &self.cfg)
            .field("measurements", &self.measurements)
            .field("targets", &self.targets)
            .field("readings", &self.readings.len())
            .field("locked", &self.locked.get())
            .finish()
    }
}

impl<const D: usize> Estimator<D> {
    /// Creates a new [Estimator] using these [Measurements] to solve these [Targets].
    pub fn new(measurements: Measurements, targets: Targets, cfg: Config) -> Result<Self, Error> {
        let targets = targets.effective(measurements);
        targets.validate()?;
        cfg.validate(targets.min_readings(D))?;

        Ok(Self {
            cfg,
            targets,
            measurements,
            readings: Vec::new(),
            quality_scores: None,
            apriori: Apriori::default(),
            listener: None,
            locked: Cell::new(false),
            estimate: None,
        })
    }

    /// Creates a new ranging [Estimator], which only estimates the position.
    pub fn ranging(cfg: Config) -> Result<Self, Error> {
        Self::new(Measurements::Ranging, Targets::position_only(), cfg)
    }

    /// Creates a new RSSI [Estimator].
    pub fn rssi(cfg: Config, targets: Targets) -> Result<Self, Error> {
        Self::new(Measurements::Rssi, targets, cfg)
    }

    /// Creates a new [Estimator] that combines ranging and RSSI.
    pub fn ranging_and_rssi(cfg: Config, targets: Targets) -> Result<Self, Error> {
        Self::new(Measurements::RangingAndRssi, targets, cfg)
    }

    fn check_unlocked(&self) -> Result<(), Error> {
        if self.locked.get() {
            Err(Error::Locked)
        } else {
            Ok(())
        }
    }

    /// [Config] in use
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// [Measurements] in use
    pub fn measurements(&self) -> Measurements {
        self.measurements
    }

    /// [Targets] to estimate
    pub fn targets(&self) -> Targets {
        self.targets
    }

    /// Readings to process
    pub fn readings(&self) -> &[Reading<D>] {
        &self.readings
    }

    /// Quality scores, if defined
    pub fn quality_scores(&self) -> Option<&[f64]> {
        self.quality_scores.as_deref()
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

    /// Minimal number of readings for the [Targets] in use
    pub fn min_readings(&self) -> usize {
        self.targets.min_readings(D)
    }

    /// Returns true while estimating
    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    /// Returns true if [Self::estimate] may be attempted
    pub fn is_ready(&self) -> bool {
        let min_readings = self.min_readings();
        if self.readings.len() < min_readings
            || self.cfg.subset_size(min_readings) > self.readings.len()
        {
            return false;
        }

        if self.cfg.method.requires_quality_scores() {
            match &self.quality_scores {
                Some(scores) if scores.len() == self.readings.len() => {},
                _ => return false,
            }
        }

        if self.measurements.uses_rssi() {
            if !self.targets.position && self.apriori.position.is_none() {
                return false;
            }
            if !self.targets.transmitted_power && self.apriori.transmitted_power_dbm.is_none() {
                return false;
            }
        }

        true
    }

    /// Updates the [Config]. Previous [Config] is kept on error.
    pub fn set_config(&mut self, cfg: Config) -> Result<(), Error> {
        self.check_unlocked()?;
        cfg.validate(self.min_readings())?;
        self.cfg = cfg;
        Ok(())
    }

    /// Updates the [Targets]. Only RSSI estimators may estimate more than the position.
    pub fn set_targets(&mut self, targets: Targets) -> Result<(), Error> {
        self.check_unlocked()?;
        let targets = targets.effective(self.measurements);
        targets.validate()?;
        self.cfg.validate(targets.min_readings(D))?;
        self.targets = targets;
        Ok(())
    }

    /// Defines the readings to process.
    pub fn set_readings(&mut self, readings: Vec<Reading<D>>) -> Result<(), Error> {
        self.check_unlocked()?;

        let min_readings = self.min_readings();
        if readings.len() < min_readings {
            return Err(Error::NotEnoughReadings(readings.len(), min_readings));
        }

        validate_readings(&readings, self.measurements)?;

        self.readings = readings;
        Ok(())
    }

    /// Defines the quality scores (higher is better), one per reading
    /// (when readings are already defined). Has no effect unless the [RobustMethod](crate::prelude::RobustMethod) in use requires them.
    pub fn set_quality_scores(&mut self, scores: Vec<f64>) -> Result<(), Error> {
        self.check_unlocked()?;

        if !self.cfg.method.requires_quality_scores() {
            debug!("{}: quality scores ignored", self.cfg.method);
            return Ok(());
        }

        validate_quality_scores(&scores, self.readings.len(), self.min_readings())?;

        self.quality_scores = Some(scores);
        Ok(())
    }

    /// Defines (or clears) the initial position. It seeds the refinement and
    /// is required when the position is not estimated.
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

    /// Defines (or clears) the initial transmitted power (dBm). It seeds the refinement and
    /// is required when the transmitted power is not estimated.
    pub fn set_initial_transmitted_power_dbm(&mut self, power: Option<f64>) -> Result<(), Error> {
        self.check_unlocked()?;
        validate_initial_value(power)?;
        self.apriori.transmitted_power_dbm = power;
        Ok(())
    }

    /// Defines (or clears) the initial path loss exponent. When the path loss exponent
    /// is not estimated, it is the value in use (free space otherwise).
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

    /// Path loss model of the radio source being measured
    fn path_loss(&self) -> PathLoss {
        self.readings
            .first()
            .map(|r| r.source.path_loss())
            .unwrap_or_default()
    }

    /// Runs the estimation. On success, the returned [Estimate] replaces
    /// the previous one. On failure, the previous [Estimate] is preserved.
    pub fn estimate(&mut self) -> Result<Estimate<D>, Error> {
        self.check_unlocked()?;

        if !self.is_ready() {
            return Err(Error::NotReady);
        }

        self.locked.set(true);

        let mut listener = self.listener.take();

        let result = {
            let view = View {
                readings: &self.readings,
                cfg: &self.cfg,
                measurements: self.measurements,
                targets: self.targets,
                min_readings: self.min_readings(),
                locked: &self.locked,
            };

            if let Some(listener) = listener.as_mut() {
                listener.on_estimate_start(&view);
            }

            let pass = Pass {
                readings: &self.readings,
                quality_scores: self.quality_scores.as_deref(),
                measurements: self.measurements,
                targets: self.targets,
                apriori: self.apriori,
                cfg: &self.cfg,
                model: self.path_loss(),
            };

            let result = pass.run(&mut |event| {
                if let Some(listener) = listener.as_mut() {
                    match event {
                        Event::NextIteration(iteration) => {
                            listener.on_estimate_next_iteration(&view, iteration)
                        },
                        Event::Progress(progress) => {
                            listener.on_estimate_progress_change(&view, progress)
                        },
                    }
                }
            });

            if let Some(listener) = listener.as_mut() {
                listener.on_estimate_end(&view);
            }

            result
        };

        self.listener = listener;
        self.locked.set(false);

        let estimate = result?;

        info!(
            "{} ({}) estimate: {} ({}/{} inliers, refined={})",
            self.cfg.method,
            self.measurements,
            estimate.position,
            estimate.inliers.num_inliers,
            self.readings.len(),
            estimate.refined,
        );

        self.estimate = Some(estimate.clone());
        Ok(estimate)
    }

    /// Latest [Estimate]
    pub fn result(&self) -> Option<&Estimate<D>> {
        self.estimate.as_ref()
    }

    /// Latest estimated position
    pub fn estimated_position(&self) -> Option<Point<f64, D>> {
        self.estimate.as_ref().map(|e| e.position)
    }

    /// Latest estimated transmitted power (dBm)
    pub fn estimated_transmitted_power_dbm(&self) -> Option<f64> {
        self.estimate.as_ref().and_then(|e| e.transmitted_power_dbm)
    }

    /// Latest estimated path loss exponent
    pub fn estimated_path_loss_exponent(&self) -> Option<f64> {
        self.estimate.as_ref().and_then(|e| e.path_loss_exponent)
    }

    /// Latest covariance of the estimated parameters
    pub fn estimated_covariance(&self) -> Option<&DMatrix<f64>> {
        self.estimate.as_ref().and_then(|e| e.covariance.matrix())
    }

    /// Latest position covariance
    pub fn estimated_position_covariance(&self) -> Option<SMatrix<f64, D, D>> {
        self.estimate.as_ref().and_then(|e| e.position_covariance())
    }

    /// Latest [InliersData]
    pub fn inliers_data(&self) -> Option<&InliersData> {
        self.estimate.as_ref().map(|e| &e.inliers)
    }

    /// Latest [Estimate] attached to the radio source being measured
    pub fn radio_source(&self) -> Option<LocatedRadioSource<D>> {
        let estimate = self.estimate.as_ref()?;
        let reading = self.readings.first()?;
        Some(reading.source.locate(estimate))
    }
}
