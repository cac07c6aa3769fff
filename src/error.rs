use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Inlier threshold (or LMedS/PROMedS stop threshold) must be strictly positive.
    #[error("threshold must be strictly positive")]
    InvalidThreshold,

    #[error("confidence must lie within ]0, 1[")]
    InvalidConfidence,

    #[error("at least one iteration is required")]
    InvalidMaxIterations,

    #[error("progress delta must lie within [0, 1]")]
    InvalidProgressDelta,

    /// Preliminary subsets cannot be smaller than the number of
    /// readings required to solve for the enabled unknowns.
    #[error("preliminary subset size {0} is below minimum {1}")]
    PreliminarySubsetTooSmall(usize, usize),

    #[error("not enough readings: {0} (minimum is {1})")]
    NotEnoughReadings(usize, usize),

    /// Quality scores must be provided for each reading.
    #[error("quality scores length mismatch")]
    QualityScoresLength,

    #[error("reading #{0}: missing distance")]
    MissingDistance(usize),

    #[error("reading #{0}: missing rssi")]
    MissingRssi(usize),

    #[error("reading #{0}: distance must be finite and positive")]
    InvalidDistance(usize),

    #[error("reading #{0}: rssi must be finite")]
    InvalidRssi(usize),

    #[error("reading #{0}: standard deviation must be finite and strictly positive")]
    InvalidStandardDeviation(usize),

    /// Position covariance attached to a reading is not symmetric positive definite.
    #[error("reading #{0}: invalid position covariance")]
    InvalidPositionCovariance(usize),

    /// Readings of a single estimation must all relate to the same radio source.
    #[error("readings relate to different radio sources")]
    MixedRadioSources,

    #[error("initial values must be finite")]
    InvalidInitialValue,

    #[error("nothing to estimate: enable at least one unknown")]
    NoEstimationTarget,

    #[error("covariance matrix is not symmetric positive semi definite")]
    InvalidCovariance,

    #[error("standard deviation factor must be strictly positive")]
    InvalidStandardDeviationFactor,

    #[error("unknown robust estimation method")]
    UnknownRobustMethod,

    /// Setters and [Estimator::estimate](crate::prelude::Estimator::estimate)
    /// are rejected while an estimation is ongoing.
    #[error("estimator is locked")]
    Locked,

    /// Not enough data (readings, quality scores, initial values) to attempt estimation.
    #[error("estimator is not ready")]
    NotReady,

    /// Sampling never produced a usable candidate.
    #[error("robust estimation failed: no valid candidate")]
    RobustEstimation,

    /// Preliminary subset or refinement system is singular:
    /// collinear (coplanar) sensors, coincident sensor and source.
    #[error("degenerate geometry (singular system)")]
    DegenerateGeometry,

    #[error("failed to invert matrix")]
    MatrixInversion,

    #[error("non linear refinement failure")]
    RefinementFailure,
}

impl Error {
    /// Returns true if this [Error] was caused by an invalid value passed to a
    /// setter or constructor. Such errors are always raised before any mutation.
    pub fn is_illegal_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidThreshold
                | Self::InvalidConfidence
                | Self::InvalidMaxIterations
                | Self::InvalidProgressDelta
                | Self::PreliminarySubsetTooSmall(..)
                | Self::NotEnoughReadings(..)
                | Self::QualityScoresLength
                | Self::MissingDistance(_)
                | Self::MissingRssi(_)
                | Self::InvalidDistance(_)
                | Self::InvalidRssi(_)
                | Self::InvalidStandardDeviation(_)
                | Self::InvalidPositionCovariance(_)
                | Self::MixedRadioSources
                | Self::InvalidInitialValue
                | Self::NoEstimationTarget
                | Self::InvalidCovariance
                | Self::InvalidStandardDeviationFactor
                | Self::UnknownRobustMethod
        )
    }
}
