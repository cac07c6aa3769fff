/// Speed of light in m.s⁻¹
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Default carrier frequency (2.4 GHz ISM band), in Hz
pub const DEFAULT_FREQUENCY_HZ: u64 = 2_400_000_000;

/// Free space path loss exponent
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 2.0;

/// Distance standard deviation (m) used when a reading does not specify one
pub const FALLBACK_DISTANCE_STD_DEV: f64 = 1.0E-3;

/// RSSI standard deviation (dB) used when a reading does not specify one
pub const FALLBACK_RSSI_STD_DEV: f64 = 1.0E-3;

/// LMedS/PROMedS inlier factor, applied to the robust standard deviation
pub const LMEDS_INLIER_FACTOR: f64 = 1.5;

/// Inlier fraction assumed by LMedS/PROMedS to size the number of iterations:
/// the breakdown point of the median.
pub const LMEDS_INLIER_RATIO: f64 = 0.5;

/// Consistency factor of the median absolute deviation, for normally distributed residuals
pub const MAD_CONSISTENCY_FACTOR: f64 = 1.4826;

/// Tolerance used in symmetry and rank checks
pub const EPSILON: f64 = 1.0E-9;
