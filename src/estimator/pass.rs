//! One robust estimation pass: robust stage, then optional refinement.
use log::{debug, warn};

use crate::{
    apriori::{Apriori, Hypothesis},
    cfg::{Config, Measurements, Targets},
    error::Error,
    estimator::{Covariance, Estimate},
    power::PathLoss,
    preliminary::PreliminarySolver,
    reading::Reading,
    refine::{LevenbergMarquardt, RadioSourceProblem},
    robust::{Consensus, Event, RobustEngine},
};

/// Inputs of one estimation [Pass]
pub(crate) struct Pass<'a, const D: usize> {
    pub readings: &'a [Reading<D>],
    pub quality_scores: Option<&'a [f64]>,
    pub measurements: Measurements,
    pub targets: Targets,
    pub apriori: Apriori<D>,
    pub cfg: &'a Config,
    pub model: PathLoss,
}

impl<const D: usize> Pass<'_, D> {
    /// Estimated unknowns
    pub fn targets(&self) -> Targets {
        self.targets.effective(self.measurements)
    }

    /// Minimal number of readings
    pub fn min_readings(&self) -> usize {
        self.targets().min_readings(D)
    }

    /// Runs this [Pass], notifying each robust [Event].
    pub fn run(&self, notify: &mut dyn FnMut(Event)) -> Result<Estimate<D>, Error> {
        let min_readings = self.min_readings();

        if self.readings.len() < min_readings {
            return Err(Error::NotReady);
        }

        let subset_size = self.cfg.subset_size(min_readings);

        if subset_size > self.readings.len() {
            debug!(
                "preliminary subsets of {} exceed {} readings",
                subset_size,
                self.readings.len()
            );
            return Err(Error::NotReady);
        }

        let solver = PreliminarySolver::new(
            self.readings,
            self.measurements,
            self.targets(),
            self.model,
            self.cfg.lateration(),
            self.apriori,
            subset_size,
            self.cfg.use_reading_position_covariance,
        );

        let quality_scores = if self.cfg.method.requires_quality_scores() {
            self.quality_scores
        } else {
            None
        };

        let mut engine = RobustEngine::new(self.cfg, quality_scores);

        let consensus = engine.run(&solver, notify)?;

        if self.cfg.refine_result {
            Ok(self.refine(consensus))
        } else {
            Ok(self.estimate(consensus.candidate, consensus, Covariance::NotRequested, false))
        }
    }

    fn estimate(
        &self,
        hypothesis: Hypothesis<D>,
        consensus: Consensus<Hypothesis<D>>,
        covariance: Covariance,
        refined: bool,
    ) -> Estimate<D> {
        let uses_rssi = self.measurements.uses_rssi();
        Estimate {
            position: hypothesis.position,
            transmitted_power_dbm: if uses_rssi {
                Some(hypothesis.transmitted_power_dbm)
            } else {
                None
            },
            path_loss_exponent: if uses_rssi {
                Some(hypothesis.path_loss_exponent)
            } else {
                None
            },
            covariance,
            inliers: consensus.inliers,
            refined,
            targets: self.targets(),
        }
    }

    /// Covariance to report when the refinement could not run
    fn missing_covariance(&self) -> Covariance {
        if self.cfg.keep_covariance {
            Covariance::Unavailable
        } else {
            Covariance::NotRequested
        }
    }

    /// Refines the robust candidate over all inliers. Falls back
    /// to the robust candidate when that is not possible.
    fn refine(&self, consensus: Consensus<Hypothesis<D>>) -> Estimate<D> {
        let candidate = consensus.candidate;
        let targets = self.targets();

        let mut seed = candidate;
        if let Some(position) = self.apriori.position {
            seed.position = position;
        }
        if let Some(power) = self.apriori.transmitted_power_dbm {
            seed.transmitted_power_dbm = power;
        }
        if let Some(exponent) = self.apriori.path_loss_exponent {
            seed.path_loss_exponent = exponent;
        }

        let unknowns = targets.unknowns(D);

        if consensus.inliers.num_inliers < unknowns {
            warn!(
                "not enough inliers to refine: {} (unknowns: {})",
                consensus.inliers.num_inliers, unknowns
            );
            let covariance = self.missing_covariance();
            return self.estimate(candidate, consensus, covariance, false);
        }

        let inliers = self
            .readings
            .iter()
            .zip(consensus.inliers.inliers.iter())
            .filter_map(|(reading, inlier)| if *inlier { Some(reading) } else { None })
            .collect::<Vec<_>>();

        let problem = RadioSourceProblem::new(
            inliers,
            self.measurements,
            targets,
            self.model,
            seed,
            self.cfg.use_reading_position_covariance,
        );

        match LevenbergMarquardt::default().minimize(&problem, problem.pack(&seed)) {
            Ok(minimum) => {
                let refined = problem.unpack(&minimum.x);

                debug!(
                    "refined {} -> {} (cost={:.6E}, {} iterations)",
                    candidate.position, refined.position, minimum.cost, minimum.iterations
                );

                let covariance = if self.cfg.keep_covariance {
                    match minimum.covariance() {
                        Ok(covariance) => Covariance::Estimated(covariance),
                        Err(e) => {
                            warn!("covariance unavailable: {}", e);
                            Covariance::Unavailable
                        },
                    }
                } else {
                    Covariance::NotRequested
                };

                self.estimate(refined, consensus, covariance, true)
            },
            Err(e) => {
                warn!("refinement failed: {}", e);
                let covariance = self.missing_covariance();
                self.estimate(candidate, consensus, covariance, false)
            },
        }
    }
}
