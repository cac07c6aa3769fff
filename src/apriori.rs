use nalgebra::Point;

use crate::constants::DEFAULT_PATH_LOSS_EXPONENT;

/// [Apriori] knowledge of the radio source: initial guesses used to
/// seed the refinement, or fixed values for unknowns that are not estimated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Apriori<const D: usize> {
    /// Initial (or fixed) position
    pub position: Option<Point<f64, D>>,
    /// Initial (or fixed) transmitted power (dBm)
    pub transmitted_power_dbm: Option<f64>,
    /// Initial (or fixed) path loss exponent
    pub path_loss_exponent: Option<f64>,
}

impl<const D: usize> Default for Apriori<D> {
    fn default() -> Self {
        Self {
            position: None,
            transmitted_power_dbm: None,
            path_loss_exponent: None,
        }
    }
}

impl<const D: usize> Apriori<D> {
    /// Path loss exponent to use when not estimated.
    pub(crate) fn path_loss_exponent_or_default(&self) -> f64 {
        self.path_loss_exponent
            .unwrap_or(DEFAULT_PATH_LOSS_EXPONENT)
    }
}

/// Radio source [Hypothesis]: one candidate solution, or the
/// refined solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Hypothesis<const D: usize> {
    pub position: Point<f64, D>,
    pub transmitted_power_dbm: f64,
    pub path_loss_exponent: f64,
}
