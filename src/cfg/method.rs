use crate::error::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Robust estimation method
#[allow(non_camel_case_types)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RobustMethod {
    /// RANdom SAmple Consensus: candidates are scored by their number of inliers,
    /// with respect to a fixed threshold.
    #[default]
    RANSAC,

    /// Least Median of Squares: candidates are scored by the median of their
    /// squared residuals. The inlier threshold is derived from the best median,
    /// the configured threshold is used as a stop criterion.
    LMedS,

    /// M-estimator SAmple Consensus: candidates are scored by their truncated
    /// sum of squared residuals.
    MSAC,

    /// PROgressive SAmple Consensus: RANSAC where subsets are drawn
    /// from progressively larger sets of best quality readings.
    /// Requires quality scores.
    PROSAC,

    /// PROgressive least MEDian of Squares: LMedS with PROSAC sampling.
    /// Requires quality scores.
    PROMedS,
}

impl RobustMethod {
    /// Returns true if this method requires quality scores
    pub fn requires_quality_scores(&self) -> bool {
        matches!(self, Self::PROSAC | Self::PROMedS)
    }

    /// Returns true if this method is scored by the median of squared residuals
    pub(crate) fn is_median_based(&self) -> bool {
        matches!(self, Self::LMedS | Self::PROMedS)
    }

    /// Default threshold: inlier threshold for consensus based methods,
    /// stop threshold for median based methods.
    pub fn default_threshold(&self) -> f64 {
        match self {
            Self::RANSAC | Self::MSAC | Self::PROSAC => 0.1,
            Self::LMedS | Self::PROMedS => 1.0E-5,
        }
    }
}

impl std::fmt::Display for RobustMethod {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::RANSAC => write!(fmt, "RANSAC"),
            Self::LMedS => write!(fmt, "LMedS"),
            Self::MSAC => write!(fmt, "MSAC"),
            Self::PROSAC => write!(fmt, "PROSAC"),
            Self::PROMedS => write!(fmt, "PROMedS"),
        }
    }
}

impl std::str::FromStr for RobustMethod {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ransac" => Ok(Self::RANSAC),
            "lmeds" => Ok(Self::LMedS),
            "msac" => Ok(Self::MSAC),
            "prosac" => Ok(Self::PROSAC),
            "promeds" => Ok(Self::PROMedS),
            _ => Err(Error::UnknownRobustMethod),
        }
    }
}
