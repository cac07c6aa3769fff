//! Robust sampling engine: draws preliminary subsets, scores each
//! candidate solution against all readings and keeps the best one,
//! adapting the number of iterations to the observed inlier ratio.
use log::{debug, warn};
use rand::{rngs::SmallRng, SeedableRng};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    cfg::{Config, RobustMethod},
    constants::LMEDS_INLIER_RATIO,
    error::Error,
};

mod lmeds;
mod msac;
mod promeds;
mod prosac;
mod ransac;
mod sampler;

use sampler::Sampler;

/// Problem solved by the robust engine.
pub(crate) trait ConsensusProblem {
    /// Candidate solution
    type Candidate: Clone;

    /// Total number of samples
    fn len(&self) -> usize;

    /// Number of samples per subset
    fn subset_size(&self) -> usize;

    /// Solves one candidate from the samples `subset`.
    fn solve(&self, subset: &[usize]) -> Result<Self::Candidate, Error>;

    /// Residual of sample `index` with respect to `candidate`.
    fn residual(&self, candidate: &Self::Candidate, index: usize) -> f64;
}

/// [InliersData] describes how each reading agreed
/// with the best robust candidate.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InliersData {
    /// Inlier flag, per reading
    pub inliers: Vec<bool>,
    /// Residual, per reading
    pub residuals: Vec<f64>,
    /// Number of inliers
    pub num_inliers: usize,
    /// Inlier threshold that was applied. Derived from the best
    /// median for the median based methods.
    pub threshold: f64,
    /// Best median of squared residuals, for median based methods
    pub best_median: Option<f64>,
}

/// Robust estimation [Event]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Event {
    /// One iteration completed, with this (1 based) iteration index.
    NextIteration(usize),
    /// Progress advanced (in [0, 1])
    Progress(f32),
}

/// One candidate [Evaluation]. The cost is always minimized.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Evaluation {
    pub cost: f64,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    pub threshold: f64,
    pub median: Option<f64>,
}

impl Evaluation {
    fn inlier_ratio(&self) -> f64 {
        if self.inliers.is_empty() {
            0.0
        } else {
            self.num_inliers as f64 / self.inliers.len() as f64
        }
    }
}

/// Robust estimation outcome
#[derive(Debug, Clone)]
pub(crate) struct Consensus<C> {
    pub candidate: C,
    pub inliers: InliersData,
    pub iterations: usize,
}

/// Number of iterations so that, with this `confidence`, at least one
/// subset of `subset_size` samples only contained inliers.
pub(crate) fn required_iterations(inlier_ratio: f64, subset_size: usize, confidence: f64) -> usize {
    let p_good = inlier_ratio.clamp(0.0, 1.0).powi(subset_size as i32);

    if p_good >= 1.0 - f64::EPSILON {
        return 1;
    }
    if p_good <= f64::MIN_POSITIVE {
        return usize::MAX;
    }

    let n = (1.0 - confidence).ln() / (1.0 - p_good).ln();

    if n.is_finite() && n < usize::MAX as f64 {
        (n.ceil() as usize).max(1)
    } else {
        usize::MAX
    }
}

/// Undefined residuals are mapped to +∞ so they never count as inliers.
fn sanitize(residual: f64) -> f64 {
    if residual.is_nan() {
        f64::INFINITY
    } else {
        residual.abs()
    }
}

/// Robust sampling engine
pub(crate) struct RobustEngine<'a> {
    method: RobustMethod,
    threshold: f64,
    confidence: f64,
    max_iterations: usize,
    progress_delta: f32,
    quality_scores: Option<&'a [f64]>,
    rng: SmallRng,
}

impl<'a> RobustEngine<'a> {
    /// Builds a new [RobustEngine] from this [Config].
    /// `quality_scores` are only used by progressive methods.
    pub fn new(cfg: &Config, quality_scores: Option<&'a [f64]>) -> Self {
        let rng = match cfg.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_rng(&mut rand::rng()),
        };

        Self {
            rng,
            method: cfg.method,
            threshold: cfg.threshold(),
            confidence: cfg.confidence,
            max_iterations: cfg.max_iterations,
            progress_delta: cfg.progress_delta,
            quality_scores,
        }
    }

    fn evaluate(&self, residuals: &[f64], subset_size: usize) -> Evaluation {
        match self.method {
            RobustMethod::RANSAC => ransac::evaluate(residuals, self.threshold),
            RobustMethod::MSAC => msac::evaluate(residuals, self.threshold),
            RobustMethod::LMedS => lmeds::evaluate(residuals, subset_size, self.threshold),
            RobustMethod::PROSAC => prosac::evaluate(residuals, self.threshold),
            RobustMethod::PROMedS => promeds::evaluate(residuals, subset_size, self.threshold),
        }
    }

    /// Runs the robust estimation of `problem`, notifying each [Event].
    pub fn run<P: ConsensusProblem>(
        &mut self,
        problem: &P,
        notify: &mut dyn FnMut(Event),
    ) -> Result<Consensus<P::Candidate>, Error> {
        let size = problem.len();
        let subset_size = problem.subset_size();

        if size < subset_size || subset_size == 0 {
            return Err(Error::NotEnoughReadings(size, subset_size));
        }

        let mut sampler = if self.method.requires_quality_scores() {
            let scores = self.quality_scores.ok_or(Error::QualityScoresLength)?;
            if scores.len() != size {
                return Err(Error::QualityScoresLength);
            }
            Sampler::progressive(scores, subset_size, self.max_iterations)
        } else {
            Sampler::uniform(size, subset_size)
        };

        let mut termination = match self.method {
            RobustMethod::PROSAC => Some(prosac::Termination::new(
                size,
                subset_size,
                self.confidence,
            )),
            _ => None,
        };

        let mut best: Option<(P::Candidate, Evaluation, Vec<f64>)> = None;
        let mut residuals = vec![0.0_f64; size];

        let mut required = self.max_iterations;
        let mut iteration = 0;
        let mut last_progress = 0.0_f32;

        while iteration < required.min(self.max_iterations) {
            let subset = sampler.sample(&mut self.rng);
            iteration += 1;

            match problem.solve(&subset) {
                Ok(candidate) => {
                    for (i, residual) in residuals.iter_mut().enumerate() {
                        *residual = sanitize(problem.residual(&candidate, i));
                    }

                    let evaluation = self.evaluate(&residuals, subset_size);

                    let improved = match &best {
                        Some((_, best, _)) => evaluation.cost < best.cost,
                        None => true,
                    };

                    if improved {
                        debug!(
                            "{} iteration {}: {} inliers (cost={:.6E})",
                            self.method, iteration, evaluation.num_inliers, evaluation.cost
                        );

                        required = match self.method {
                            RobustMethod::RANSAC | RobustMethod::MSAC => required_iterations(
                                evaluation.inlier_ratio(),
                                subset_size,
                                self.confidence,
                            ),
                            RobustMethod::LMedS | RobustMethod::PROMedS => {
                                let median = evaluation.median.unwrap_or(f64::INFINITY);
                                if median.sqrt() <= self.threshold {
                                    // good enough: stop now
                                    iteration
                                } else {
                                    // sized on the median breakdown point, never on the
                                    // threshold derived from this candidate
                                    required_iterations(
                                        LMEDS_INLIER_RATIO,
                                        subset_size,
                                        self.confidence,
                                    )
                                }
                            },
                            RobustMethod::PROSAC => match (termination.as_mut(), sampler.order()) {
                                (Some(termination), Some(order)) => {
                                    termination.update(&evaluation.inliers, order)
                                },
                                _ => required,
                            },
                        };

                        best = Some((candidate, evaluation, residuals.clone()));
                    }
                },
                Err(e) => {
                    debug!("{} iteration {}: {}", self.method, iteration, e);
                },
            }

            notify(Event::NextIteration(iteration));

            let total = required.min(self.max_iterations).max(iteration);
            let progress = (iteration as f32 / total as f32).min(1.0);

            if progress - last_progress >= self.progress_delta || (progress >= 1.0 && last_progress < 1.0) {
                notify(Event::Progress(progress));
                last_progress = progress;
            }
        }

        let (candidate, evaluation, residuals) = best.ok_or_else(|| {
            warn!("{}: no valid candidate after {} iterations", self.method, iteration);
            Error::RobustEstimation
        })?;

        if iteration >= self.max_iterations && required > self.max_iterations {
            warn!(
                "{}: reached max iterations ({}) before requested confidence",
                self.method, self.max_iterations
            );
        }

        debug!(
            "{}: {}/{} inliers after {} iterations",
            self.method, evaluation.num_inliers, size, iteration
        );

        Ok(Consensus {
            candidate,
            iterations: iteration,
            inliers: InliersData {
                inliers: evaluation.inliers,
                residuals,
                num_inliers: evaluation.num_inliers,
                threshold: evaluation.threshold,
                best_median: evaluation.median,
            },
        })
    }
}
