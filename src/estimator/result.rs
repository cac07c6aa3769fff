use nalgebra::{DMatrix, Point, SMatrix};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{cfg::Targets, power::dbm_to_power, robust::InliersData};

/// Covariance of the estimated parameters
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Covariance {
    /// Covariance was not requested, or the result was not refined on purpose.
    #[default]
    NotRequested,
    /// Covariance was requested but could not be obtained:
    /// refinement failed or the normal matrix is not positive definite.
    Unavailable,
    /// Covariance of the estimated parameters, stacked as
    /// `[position?, transmitted power?, path loss exponent?]`.
    Estimated(DMatrix<f64>),
}

impl Covariance {
    /// Returns the covariance matrix, if estimated
    pub fn matrix(&self) -> Option<&DMatrix<f64>> {
        match self {
            Self::Estimated(m) => Some(m),
            _ => None,
        }
    }

    /// Returns true if the covariance was estimated
    pub fn is_estimated(&self) -> bool {
        matches!(self, Self::Estimated(_))
    }
}

/// Radio source [Estimate]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Estimate<const D: usize> {
    /// Estimated position, or the fixed initial position when
    /// position estimation was disabled.
    pub position: Point<f64, D>,
    /// Transmitted power (dBm), for estimators using RSSI.
    /// Fixed initial value when not estimated.
    pub transmitted_power_dbm: Option<f64>,
    /// Path loss exponent, for estimators using RSSI.
    /// Fixed (or default) value when not estimated.
    pub path_loss_exponent: Option<f64>,
    /// [Covariance] of the estimated parameters
    pub covariance: Covariance,
    /// [InliersData] of the robust stage
    pub inliers: InliersData,
    /// True when this solution was refined using all inliers
    pub refined: bool,
    /// Estimated parameters: layout of the [Covariance]
    pub targets: Targets,
}

impl<const D: usize> Estimate<D> {
    fn power_index(&self) -> Option<usize> {
        if self.targets.transmitted_power {
            Some(if self.targets.position { D } else { 0 })
        } else {
            None
        }
    }

    fn exponent_index(&self) -> Option<usize> {
        if self.targets.path_loss_exponent {
            Some(self.targets.unknowns(D) - 1)
        } else {
            None
        }
    }

    /// Position covariance (m²), when estimated
    pub fn position_covariance(&self) -> Option<SMatrix<f64, D, D>> {
        if !self.targets.position {
            return None;
        }
        let m = self.covariance.matrix()?;
        Some(SMatrix::<f64, D, D>::from_fn(|i, j| m[(i, j)]))
    }

    /// Transmitted power variance (dBm²), when estimated
    pub fn transmitted_power_variance(&self) -> Option<f64> {
        let i = self.power_index()?;
        self.covariance.matrix().map(|m| m[(i, i)])
    }

    /// Path loss exponent variance, when estimated
    pub fn path_loss_exponent_variance(&self) -> Option<f64> {
        let i = self.exponent_index()?;
        self.covariance.matrix().map(|m| m[(i, i)])
    }

    /// Transmitted power (mW)
    pub fn transmitted_power_mw(&self) -> Option<f64> {
        self.transmitted_power_dbm.map(dbm_to_power)
    }

    /// Transmitted power standard deviation (dBm), when estimated
    pub fn transmitted_power_std_dev(&self) -> Option<f64> {
        self.transmitted_power_variance().map(f64::sqrt)
    }
}
