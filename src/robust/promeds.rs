use super::{lmeds, Evaluation};

/// PROMedS scores candidates like LMedS. Only the
/// sampling (progressive) differs.
pub(crate) fn evaluate(residuals: &[f64], subset_size: usize, stop_threshold: f64) -> Evaluation {
    lmeds::evaluate(residuals, subset_size, stop_threshold)
}
