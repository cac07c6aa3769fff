use itertools::Itertools;

use super::Evaluation;

use crate::constants::{LMEDS_INLIER_FACTOR, MAD_CONSISTENCY_FACTOR};

/// Median of the squared residuals
pub(crate) fn median_of_squares(residuals: &[f64]) -> f64 {
    let sorted = residuals
        .iter()
        .map(|r| r * r)
        .sorted_by(|a, b| a.total_cmp(b))
        .collect::<Vec<_>>();

    let n = sorted.len();
    if n == 0 {
        f64::INFINITY
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Inlier threshold derived from the robust standard deviation
/// `σ = 1.4826 (1 + 5 / (n - s)) √median`.
pub(crate) fn inlier_threshold(median: f64, size: usize, subset_size: usize) -> f64 {
    let dof = size.saturating_sub(subset_size).max(1) as f64;
    let sigma = MAD_CONSISTENCY_FACTOR * (1.0 + 5.0 / dof) * median.sqrt();
    LMEDS_INLIER_FACTOR * sigma
}

/// LMedS scoring: median of the squared residuals. Inliers are
/// identified with the derived threshold, never tighter than `stop_threshold`.
pub(crate) fn evaluate(residuals: &[f64], subset_size: usize, stop_threshold: f64) -> Evaluation {
    let median = median_of_squares(residuals);

    let threshold = inlier_threshold(median, residuals.len(), subset_size).max(stop_threshold);

    let inliers = residuals
        .iter()
        .map(|r| *r <= threshold)
        .collect::<Vec<_>>();

    let num_inliers = inliers.iter().filter(|inlier| **inlier).count();

    Evaluation {
        cost: median,
        inliers,
        num_inliers,
        threshold,
        median: Some(median),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn medians() {
        assert_eq!(median_of_squares(&[3.0, 1.0, 2.0]), 4.0);
        assert_eq!(median_of_squares(&[1.0, 3.0, 2.0, 4.0]), 6.5);
        assert_eq!(median_of_squares(&[]), f64::INFINITY);
    }

    #[test]
    fn derived_threshold() {
        let residuals = [0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 8.0, 9.0];
        let evaluation = evaluate(&residuals, 3, 1.0E-5);

        assert!((evaluation.median.unwrap() - 0.01).abs() < 1e-12);

        // 1.5 x 1.4826 x 1.5 x 0.1
        assert!((evaluation.threshold - 0.333585).abs() < 1e-6);
        assert_eq!(evaluation.num_inliers, 11);
        assert!(!evaluation.inliers[11]);
        assert!(!evaluation.inliers[12]);
    }

    #[test]
    fn exact_fit() {
        let evaluation = evaluate(&[0.0, 0.0, 0.0, 0.0, 10.0], 2, 1.0E-5);
        assert_eq!(evaluation.median, Some(0.0));
        assert_eq!(evaluation.threshold, 1.0E-5);
        assert_eq!(evaluation.num_inliers, 4);
    }
}
