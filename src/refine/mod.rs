//! Non linear least squares refinement.
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

use crate::error::Error;

mod problem;
pub(crate) use problem::RadioSourceProblem;

/// Whitened least squares problem: the minimizer looks for
/// the parameters that minimize `|r(x)|²`.
pub(crate) trait LeastSquaresProblem {
    /// Evaluates residuals `r(x)` and their jacobian `∂r/∂x` at `x`.
    /// Returns None when the model is not defined at `x`.
    fn evaluate(&self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)>;
}

/// Converged [Minimum].
#[derive(Debug, Clone)]
pub(crate) struct Minimum {
    /// Parameters at the minimum
    pub x: DVector<f64>,
    /// Jacobian at the minimum
    pub jacobian: DMatrix<f64>,
    /// Sum of squared (whitened) residuals
    pub cost: f64,
    /// Number of accepted steps
    pub iterations: usize,
}

impl Minimum {
    /// Parameters covariance `(JᵀJ)⁻¹`, valid for whitened residuals.
    pub fn covariance(&self) -> Result<DMatrix<f64>, Error> {
        covariance(&self.jacobian)
    }
}

/// Covariance `(JᵀJ)⁻¹` of a whitened least squares problem,
/// obtained from the Cholesky decomposition of the normal matrix.
pub(crate) fn covariance(jacobian: &DMatrix<f64>) -> Result<DMatrix<f64>, Error> {
    let jtj = jacobian.transpose() * jacobian;

    let chol = jtj.cholesky().ok_or(Error::MatrixInversion)?;
    let inv = chol.inverse();

    if inv.iter().any(|x| !x.is_finite()) {
        return Err(Error::MatrixInversion);
    }

    // numerical symmetry
    Ok((&inv + inv.transpose()) * 0.5)
}

/// Levenberg-Marquardt minimizer with multiplicative damping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LevenbergMarquardt {
    /// Maximal number of iterations
    pub max_iterations: usize,
    /// Convergence threshold on the gradient norm
    pub gradient_tolerance: f64,
    /// Relative convergence threshold on the step size
    pub step_tolerance: f64,
    /// Relative convergence threshold on the cost reduction
    pub cost_tolerance: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            gradient_tolerance: 1.0E-12,
            step_tolerance: 1.0E-12,
            cost_tolerance: 1.0E-14,
        }
    }
}

const INITIAL_DAMPING: f64 = 1.0E-3;
const MAX_DAMPING: f64 = 1.0E16;
const MIN_DAMPING: f64 = 1.0E-15;

impl LevenbergMarquardt {
    /// Minimizes `problem`, starting from `x0`.
    pub fn minimize<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        x0: DVector<f64>,
    ) -> Result<Minimum, Error> {
        let (mut residuals, mut jacobian) =
            problem.evaluate(&x0).ok_or(Error::RefinementFailure)?;

        let mut x = x0;
        let mut cost = residuals.norm_squared();

        if !cost.is_finite() {
            return Err(Error::RefinementFailure);
        }

        let mut jtj = jacobian.transpose() * &jacobian;
        let mut gradient = jacobian.transpose() * &residuals;

        let mut damping = INITIAL_DAMPING * jtj.diagonal().max().max(1.0);
        let mut iterations = 0;

        for _ in 0..self.max_iterations {
            if gradient.amax() < self.gradient_tolerance {
                trace!("lm: gradient converged");
                break;
            }

            let mut augmented = jtj.clone();
            for i in 0..augmented.nrows() {
                augmented[(i, i)] += damping * jtj[(i, i)].max(MIN_DAMPING);
            }

            let step = match augmented.cholesky() {
                Some(chol) => chol.solve(&(-&gradient)),
                None => {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        break;
                    }
                    continue;
                },
            };

            let candidate = &x + &step;

            let accepted = match problem.evaluate(&candidate) {
                Some((r, j)) => {
                    let new_cost = r.norm_squared();
                    if new_cost.is_finite() && new_cost < cost {
                        Some((r, j, new_cost))
                    } else {
                        None
                    }
                },
                None => None,
            };

            match accepted {
                Some((r, j, new_cost)) => {
                    let reduction = cost - new_cost;
                    let converged = step.norm() <= self.step_tolerance * (x.norm() + self.step_tolerance)
                        || reduction <= self.cost_tolerance * cost;

                    x = candidate;
                    residuals = r;
                    jacobian = j;
                    cost = new_cost;
                    iterations += 1;

                    jtj = jacobian.transpose() * &jacobian;
                    gradient = jacobian.transpose() * &residuals;
                    damping = (damping / 10.0).max(MIN_DAMPING);

                    if converged {
                        trace!("lm: step converged");
                        break;
                    }
                },
                None => {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        // no further progress possible
                        break;
                    }
                },
            }
        }

        if x.iter().any(|x| !x.is_finite()) {
            return Err(Error::RefinementFailure);
        }

        debug!("lm: cost={:.6E} after {} iterations", cost, iterations);

        Ok(Minimum {
            x,
            jacobian,
            cost,
            iterations,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Fits `y = a exp(b t)`
    struct Exponential {
        samples: Vec<(f64, f64)>,
    }

    impl LeastSquaresProblem for Exponential {
        fn evaluate(&self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
            let (a, b) = (x[0], x[1]);
            let n = self.samples.len();
            let mut r = DVector::zeros(n);
            let mut j = DMatrix::zeros(n, 2);
            for (i, (t, y)) in self.samples.iter().enumerate() {
                let e = (b * t).exp();
                r[i] = a * e - y;
                j[(i, 0)] = e;
                j[(i, 1)] = a * t * e;
            }
            Some((r, j))
        }
    }

    #[test]
    fn exponential_fit() {
        let samples = (0..20)
            .map(|i| {
                let t = i as f64 * 0.1;
                (t, 2.5 * (-0.7 * t).exp())
            })
            .collect();

        let problem = Exponential { samples };

        let minimum = LevenbergMarquardt::default()
            .minimize(&problem, DVector::from_vec(vec![1.0, 0.0]))
            .unwrap();

        assert!((minimum.x[0] - 2.5).abs() < 1e-6);
        assert!((minimum.x[1] + 0.7).abs() < 1e-6);
        assert!(minimum.cost < 1e-12);
        assert!(minimum.iterations > 0);
        assert!(minimum.iterations < LevenbergMarquardt::default().max_iterations);

        let covariance = minimum.covariance().unwrap();
        assert_eq!(covariance.shape(), (2, 2));
        assert_eq!(covariance, covariance.transpose());
        assert!(covariance[(0, 0)] > 0.0);
        assert!(covariance[(1, 1)] > 0.0);
    }

    #[test]
    fn singular_covariance() {
        let jacobian = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        assert_eq!(covariance(&jacobian), Err(Error::MatrixInversion));
    }
}
