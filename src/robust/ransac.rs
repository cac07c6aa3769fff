use super::Evaluation;

/// RANSAC scoring: number of residuals strictly below `threshold`.
/// Cost is the opposite of the inlier count.
pub(crate) fn evaluate(residuals: &[f64], threshold: f64) -> Evaluation {
    let inliers = residuals
        .iter()
        .map(|r| *r < threshold)
        .collect::<Vec<_>>();

    let num_inliers = inliers.iter().filter(|inlier| **inlier).count();

    Evaluation {
        cost: -(num_inliers as f64),
        inliers,
        num_inliers,
        threshold,
        median: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inlier_count() {
        let evaluation = evaluate(&[0.0, 0.05, 0.1, 0.5, f64::INFINITY], 0.1);
        assert_eq!(evaluation.inliers, vec![true, true, false, false, false]);
        assert_eq!(evaluation.num_inliers, 2);
        assert_eq!(evaluation.cost, -2.0);
        assert_eq!(evaluation.median, None);
    }
}
