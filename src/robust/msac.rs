use super::Evaluation;

/// MSAC scoring: squared residuals truncated to `threshold²`, summed.
pub(crate) fn evaluate(residuals: &[f64], threshold: f64) -> Evaluation {
    let t2 = threshold * threshold;

    let mut cost = 0.0;
    let mut num_inliers = 0;
    let mut inliers = Vec::with_capacity(residuals.len());

    for r in residuals.iter() {
        let inlier = *r < threshold;
        if inlier {
            num_inliers += 1;
            cost += r * r;
        } else {
            cost += t2;
        }
        inliers.push(inlier);
    }

    Evaluation {
        cost,
        inliers,
        num_inliers,
        threshold,
        median: None,
    }
}
