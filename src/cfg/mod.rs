#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{error::Error, lateration::Lateration};

mod method;
pub use method::RobustMethod;

/// Measurements contributing to the estimation
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Measurements {
    /// Ranging only: position is estimated from distances.
    #[default]
    Ranging,
    /// RSSI only: position and/or transmitted power and/or path loss
    /// exponent are estimated from received power.
    Rssi,
    /// Both ranging and RSSI measurements contribute.
    RangingAndRssi,
}

impl Measurements {
    /// Returns true if ranging measurements are used
    pub fn uses_ranging(&self) -> bool {
        matches!(self, Self::Ranging | Self::RangingAndRssi)
    }

    /// Returns true if RSSI measurements are used
    pub fn uses_rssi(&self) -> bool {
        matches!(self, Self::Rssi | Self::RangingAndRssi)
    }
}

impl std::fmt::Display for Measurements {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Ranging => write!(f, "ranging"),
            Self::Rssi => write!(f, "rssi"),
            Self::RangingAndRssi => write!(f, "ranging+rssi"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Unknowns to be estimated. Only meaningful for estimators using
/// RSSI [Measurements]: ranging alone only ever resolves the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Targets {
    /// Estimate the radio source position
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub position: bool,
    /// Estimate the transmitted power
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub transmitted_power: bool,
    /// Estimate the path loss exponent
    #[cfg_attr(feature = "serde", serde(default))]
    pub path_loss_exponent: bool,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            position: default_true(),
            transmitted_power: default_true(),
            path_loss_exponent: false,
        }
    }
}

impl Targets {
    /// Position only
    pub fn position_only() -> Self {
        Self {
            position: true,
            transmitted_power: false,
            path_loss_exponent: false,
        }
    }

    /// Position, transmitted power and path loss exponent
    pub fn all() -> Self {
        Self {
            position: true,
            transmitted_power: true,
            path_loss_exponent: true,
        }
    }

    /// Copies and returns [Targets] with position estimation enabled or disabled.
    pub fn with_position(&self, enabled: bool) -> Self {
        let mut s = *self;
        s.position = enabled;
        s
    }

    /// Copies and returns [Targets] with transmitted power estimation enabled or disabled.
    pub fn with_transmitted_power(&self, enabled: bool) -> Self {
        let mut s = *self;
        s.transmitted_power = enabled;
        s
    }

    /// Copies and returns [Targets] with path loss exponent estimation enabled or disabled.
    pub fn with_path_loss_exponent(&self, enabled: bool) -> Self {
        let mut s = *self;
        s.path_loss_exponent = enabled;
        s
    }

    /// [Targets] that actually apply to these [Measurements]
    pub(crate) fn effective(&self, measurements: Measurements) -> Self {
        if measurements.uses_rssi() {
            *self
        } else {
            Self::position_only()
        }
    }

    /// Number of scalar unknowns, in dimension `dim`
    pub(crate) fn unknowns(&self, dim: usize) -> usize {
        let mut n = 0;
        if self.position {
            n += dim;
        }
        if self.transmitted_power {
            n += 1;
        }
        if self.path_loss_exponent {
            n += 1;
        }
        n
    }

    /// Minimal number of readings, in dimension `dim`,
    /// to resolve a preliminary solution.
    pub(crate) fn min_readings(&self, dim: usize) -> usize {
        self.unknowns(dim) + 1
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.position || self.transmitted_power || self.path_loss_exponent {
            Ok(())
        } else {
            Err(Error::NoEstimationTarget)
        }
    }
}

fn default_confidence() -> f64 {
    0.99
}

fn default_max_iterations() -> usize {
    5000
}

fn default_progress_delta() -> f32 {
    0.05
}

fn default_refine_result() -> bool {
    true
}

fn default_keep_covariance() -> bool {
    true
}

fn default_homogeneous_linear_solver() -> bool {
    false
}

fn default_use_reading_position_covariance() -> bool {
    true
}

/// Robust estimation [Config]uration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// [RobustMethod] in use.
    #[cfg_attr(feature = "serde", serde(default))]
    pub method: RobustMethod,
    /// Inlier threshold (RANSAC, MSAC, PROSAC) or stop threshold (LMedS, PROMedS),
    /// in units of residual (m for ranging, dB for RSSI).
    /// When undefined, [RobustMethod::default_threshold] applies.
    #[cfg_attr(feature = "serde", serde(default))]
    pub threshold: Option<f64>,
    /// Confidence (]0, 1[) that we reached the best solution, that
    /// adapts the number of iterations.
    #[cfg_attr(feature = "serde", serde(default = "default_confidence"))]
    pub confidence: f64,
    /// Maximal number of sampling iterations.
    #[cfg_attr(feature = "serde", serde(default = "default_max_iterations"))]
    pub max_iterations: usize,
    /// Progress notifications granularity ([0, 1]).
    #[cfg_attr(feature = "serde", serde(default = "default_progress_delta"))]
    pub progress_delta: f32,
    /// Number of readings per preliminary subset. When undefined, subsets
    /// have the minimal size.
    #[cfg_attr(feature = "serde", serde(default))]
    pub preliminary_subset_size: Option<usize>,
    /// Refine the robust solution using all inliers.
    #[cfg_attr(feature = "serde", serde(default = "default_refine_result"))]
    pub refine_result: bool,
    /// Keep the covariance of the refined solution.
    #[cfg_attr(feature = "serde", serde(default = "default_keep_covariance"))]
    pub keep_covariance: bool,
    /// Use the homogeneous linear lateration solver, which is more robust
    /// to near degenerate geometries, instead of the inhomogeneous one.
    #[cfg_attr(feature = "serde", serde(default = "default_homogeneous_linear_solver"))]
    pub homogeneous_linear_solver: bool,
    /// Propagate the sensor position covariance of each reading
    /// (when defined) into the refinement weights.
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_use_reading_position_covariance")
    )]
    pub use_reading_position_covariance: bool,
    /// Sampling seed, for reproducible estimations.
    #[cfg_attr(feature = "serde", serde(default))]
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            method: RobustMethod::default(),
            threshold: None,
            confidence: default_confidence(),
            max_iterations: default_max_iterations(),
            progress_delta: default_progress_delta(),
            preliminary_subset_size: None,
            refine_result: default_refine_result(),
            keep_covariance: default_keep_covariance(),
            homogeneous_linear_solver: default_homogeneous_linear_solver(),
            use_reading_position_covariance: default_use_reading_position_covariance(),
            seed: None,
        }
    }
}

impl Config {
    /// Returns default [Config] for this [RobustMethod].
    /// You can then customize [Self] as you will.
    pub fn with_method(method: RobustMethod) -> Self {
        let mut s = Self::default();
        s.method = method;
        s
    }

    /// Copies and returns [Config] with updated [RobustMethod].
    pub fn with_robust_method(&self, method: RobustMethod) -> Self {
        let mut s = self.clone();
        s.method = method;
        s
    }

    /// Copies and returns [Config] with specified threshold.
    pub fn with_threshold(&self, threshold: f64) -> Self {
        let mut s = self.clone();
        s.threshold = Some(threshold);
        s
    }

    /// Copies and returns [Config] with specified confidence.
    pub fn with_confidence(&self, confidence: f64) -> Self {
        let mut s = self.clone();
        s.confidence = confidence;
        s
    }

    /// Copies and returns [Config] with maximal number of iterations.
    pub fn with_max_iterations(&self, max_iterations: usize) -> Self {
        let mut s = self.clone();
        s.max_iterations = max_iterations;
        s
    }

    /// Copies and returns [Config] with progress notification granularity.
    pub fn with_progress_delta(&self, progress_delta: f32) -> Self {
        let mut s = self.clone();
        s.progress_delta = progress_delta;
        s
    }

    /// Copies and returns [Config] with preliminary subset size.
    pub fn with_preliminary_subset_size(&self, size: usize) -> Self {
        let mut s = self.clone();
        s.preliminary_subset_size = Some(size);
        s
    }

    /// Copies and returns [Config] with refinement enabled or disabled.
    pub fn with_refinement(&self, refine: bool) -> Self {
        let mut s = self.clone();
        s.refine_result = refine;
        s
    }

    /// Copies and returns [Config] with covariance conservation enabled or disabled.
    pub fn with_covariance(&self, keep: bool) -> Self {
        let mut s = self.clone();
        s.keep_covariance = keep;
        s
    }

    /// Copies and returns [Config] with homogeneous linear solver preference.
    pub fn with_homogeneous_linear_solver(&self, homogeneous: bool) -> Self {
        let mut s = self.clone();
        s.homogeneous_linear_solver = homogeneous;
        s
    }

    /// Copies and returns [Config] with reading position covariance usage.
    pub fn with_reading_position_covariance(&self, used: bool) -> Self {
        let mut s = self.clone();
        s.use_reading_position_covariance = used;
        s
    }

    /// Copies and returns [Config] with sampling seed.
    pub fn with_seed(&self, seed: u64) -> Self {
        let mut s = self.clone();
        s.seed = Some(seed);
        s
    }

    /// Threshold in use
    pub fn threshold(&self) -> f64 {
        self.threshold
            .unwrap_or_else(|| self.method.default_threshold())
    }

    /// [Lateration] solver in use
    pub(crate) fn lateration(&self) -> Lateration {
        if self.homogeneous_linear_solver {
            Lateration::Homogeneous
        } else {
            Lateration::Inhomogeneous
        }
    }

    /// Preliminary subset size, given the minimal number of readings.
    pub(crate) fn subset_size(&self, min_readings: usize) -> usize {
        self.preliminary_subset_size.unwrap_or(min_readings)
    }

    /// Verifies this [Config], given the minimal number of readings
    /// of the estimator it applies to.
    pub(crate) fn validate(&self, min_readings: usize) -> Result<(), Error> {
        if let Some(threshold) = self.threshold {
            if !(threshold > 0.0) || !threshold.is_finite() {
                return Err(Error::InvalidThreshold);
            }
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(Error::InvalidConfidence);
        }
        if self.max_iterations < 1 {
            return Err(Error::InvalidMaxIterations);
        }
        if !(0.0..=1.0).contains(&self.progress_delta) {
            return Err(Error::InvalidProgressDelta);
        }
        if let Some(size) = self.preliminary_subset_size {
            if size < min_readings {
                return Err(Error::PreliminarySubsetTooSmall(size, min_readings));
            }
        }
        Ok(())
    }
}
