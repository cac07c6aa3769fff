use super::{ransac, required_iterations, Evaluation};

/// Probability that a sample is consistent with a wrong candidate
const BETA: f64 = 0.05;

/// Acceptable probability that a consensus happened by chance
const PSI: f64 = 0.05;

/// PROSAC scores candidates like RANSAC.
pub(crate) fn evaluate(residuals: &[f64], threshold: f64) -> Evaluation {
    ransac::evaluate(residuals, threshold)
}

/// Minimal number of inliers among the `n` best samples, so that
/// the consensus is unlikely to be random (non-randomness criterion).
/// Inliers of a wrong candidate follow `s + Binomial(n - s, β)`.
fn min_inliers(n: usize, subset_size: usize) -> usize {
    let m = n - subset_size;

    let ln_odds = (BETA / (1.0 - BETA)).ln();

    // ln P(X = i), for i = 0..=m
    let mut ln_pmf = Vec::with_capacity(m + 1);
    ln_pmf.push(m as f64 * (1.0 - BETA).ln());
    for i in 1..=m {
        let prev = ln_pmf[i - 1];
        ln_pmf.push(prev + ((m - i + 1) as f64 / i as f64).ln() + ln_odds);
    }

    let mut tail = 0.0;
    for i in (0..=m).rev() {
        tail += ln_pmf[i].exp();
        if tail >= PSI {
            return subset_size + i + 1;
        }
    }

    subset_size
}

/// PROSAC [Termination] criteria: the best candidate must be
/// non random and maximal among the prefixes of samples sorted by quality.
pub(crate) struct Termination {
    subset_size: usize,
    confidence: f64,
    /// Non randomness threshold, indexed by prefix size
    min_inliers: Vec<usize>,
}

impl Termination {
    pub fn new(size: usize, subset_size: usize, confidence: f64) -> Self {
        let min_inliers = (0..=size)
            .map(|n| {
                if n < subset_size {
                    usize::MAX
                } else {
                    // short prefixes can't reach the bound:
                    // they must then be entirely consistent
                    min_inliers(n, subset_size).min(n)
                }
            })
            .collect();

        Self {
            subset_size,
            confidence,
            min_inliers,
        }
    }

    /// Updates the criteria with the `inliers` of a new best candidate,
    /// `order` being the sample indices by decreasing quality.
    /// Returns the number of iterations required.
    pub fn update(&mut self, inliers: &[bool], order: &[usize]) -> usize {
        let mut required = usize::MAX;
        let mut prefix_inliers = 0;

        for (n, index) in order.iter().enumerate() {
            if inliers[*index] {
                prefix_inliers += 1;
            }

            let n = n + 1;
            if n < self.subset_size || prefix_inliers < self.min_inliers[n] {
                continue;
            }

            let k = required_iterations(
                prefix_inliers as f64 / n as f64,
                self.subset_size,
                self.confidence,
            );

            required = required.min(k);
        }

        required
    }
}
