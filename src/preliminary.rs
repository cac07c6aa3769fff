//! Preliminary solver: solves one candidate from a subset of readings.
use log::trace;
use nalgebra::{Point, SVector};

use crate::{
    apriori::{Apriori, Hypothesis},
    cfg::{Measurements, Targets},
    error::Error,
    lateration::Lateration,
    pathloss,
    power::PathLoss,
    reading::Reading,
    refine::{LevenbergMarquardt, RadioSourceProblem},
    robust::ConsensusProblem,
};

/// [PreliminarySolver] solves candidate radio sources from subsets
/// of readings, and scores them against each reading.
pub(crate) struct PreliminarySolver<'a, const D: usize> {
    readings: &'a [Reading<D>],
    measurements: Measurements,
    targets: Targets,
    model: PathLoss,
    lateration: Lateration,
    apriori: Apriori<D>,
    subset_size: usize,
    use_position_covariance: bool,
}

impl<'a, const D: usize> PreliminarySolver<'a, D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        readings: &'a [Reading<D>],
        measurements: Measurements,
        targets: Targets,
        model: PathLoss,
        lateration: Lateration,
        apriori: Apriori<D>,
        subset_size: usize,
        use_position_covariance: bool,
    ) -> Self {
        Self {
            readings,
            measurements,
            targets: targets.effective(measurements),
            model,
            lateration,
            apriori,
            subset_size,
            use_position_covariance,
        }
    }

    /// Transmitted power to use when it is not estimated
    fn fixed_power(&self) -> Option<f64> {
        if self.targets.transmitted_power {
            None
        } else {
            self.apriori.transmitted_power_dbm
        }
    }

    /// Path loss exponent to use when it is not estimated
    fn fixed_exponent(&self) -> Option<f64> {
        if self.targets.path_loss_exponent {
            None
        } else {
            Some(self.apriori.path_loss_exponent_or_default())
        }
    }

    fn fixed_position(&self) -> Result<Point<f64, D>, Error> {
        self.apriori.position.ok_or(Error::NotReady)
    }

    /// Closed form power and exponent fit at `position`.
    fn fit(&self, subset: &[&Reading<D>], position: &Point<f64, D>) -> Result<Hypothesis<D>, Error> {
        if self.targets.transmitted_power || self.targets.path_loss_exponent {
            let fitted = pathloss::fit(
                &self.model,
                position,
                subset
                    .iter()
                    .filter_map(|r| r.rssi.map(|rssi| (&r.position, rssi))),
                self.fixed_power(),
                self.fixed_exponent(),
            )?;

            Ok(Hypothesis {
                position: *position,
                transmitted_power_dbm: fitted.transmitted_power_dbm,
                path_loss_exponent: fitted.path_loss_exponent,
            })
        } else {
            Ok(Hypothesis {
                position: *position,
                transmitted_power_dbm: self.fixed_power().ok_or(Error::NotReady)?,
                path_loss_exponent: self.apriori.path_loss_exponent_or_default(),
            })
        }
    }

    /// RSSI only position: seeded at the initial position (or subset centroid),
    /// then solved by non linear least squares on the subset.
    fn rssi_position(&self, subset: &[&Reading<D>]) -> Result<Hypothesis<D>, Error> {
        let seed = match self.apriori.position {
            Some(position) => position,
            None => {
                let sum = subset
                    .iter()
                    .fold(SVector::<f64, D>::zeros(), |acc, r| acc + r.position.coords);
                Point::from(sum / subset.len() as f64)
            },
        };

        let seed = match self.fit(subset, &seed) {
            Ok(hypothesis) => hypothesis,
            Err(e) => {
                trace!("rssi seed fit: {}", e);
                // mean rssi for lack of a better guess
                let mean_rssi = subset.iter().filter_map(|r| r.rssi).sum::<f64>() / subset.len() as f64;
                Hypothesis {
                    position: seed,
                    transmitted_power_dbm: self
                        .apriori
                        .transmitted_power_dbm
                        .unwrap_or(mean_rssi),
                    path_loss_exponent: self.apriori.path_loss_exponent_or_default(),
                }
            },
        };

        let problem = RadioSourceProblem::new(
            subset.to_vec(),
            self.measurements,
            self.targets,
            self.model,
            seed,
            self.use_position_covariance,
        );

        let minimum = LevenbergMarquardt::default().minimize(&problem, problem.pack(&seed))?;

        Ok(problem.unpack(&minimum.x))
    }

    /// Solves one [Hypothesis] from these readings.
    pub fn solve_readings(&self, subset: &[&Reading<D>]) -> Result<Hypothesis<D>, Error> {
        match self.measurements {
            Measurements::Ranging => {
                let position = self.laterate(subset)?;
                Ok(Hypothesis {
                    position,
                    transmitted_power_dbm: self.apriori.transmitted_power_dbm.unwrap_or_default(),
                    path_loss_exponent: self.apriori.path_loss_exponent_or_default(),
                })
            },
            Measurements::RangingAndRssi => {
                let position = if self.targets.position {
                    self.laterate(subset)?
                } else {
                    self.fixed_position()?
                };
                self.fit(subset, &position)
            },
            Measurements::Rssi => {
                if self.targets.position {
                    self.rssi_position(subset)
                } else {
                    let position = self.fixed_position()?;
                    self.fit(subset, &position)
                }
            },
        }
    }

    fn laterate(&self, subset: &[&Reading<D>]) -> Result<Point<f64, D>, Error> {
        let mut positions = Vec::with_capacity(subset.len());
        let mut distances = Vec::with_capacity(subset.len());

        for reading in subset.iter() {
            let distance = reading.distance.ok_or(Error::DegenerateGeometry)?;
            positions.push(reading.position);
            distances.push(distance);
        }

        self.lateration.solve(&positions, &distances)
    }

    /// Residual of `reading` with respect to `hypothesis`:
    /// absolute ranging and/or RSSI error, averaged when both apply.
    pub fn reading_residual(&self, hypothesis: &Hypothesis<D>, reading: &Reading<D>) -> f64 {
        let distance = (hypothesis.position - reading.position).norm();

        let ranging = || match reading.distance {
            Some(measured) => (distance - measured).abs(),
            None => f64::INFINITY,
        };

        let rssi = || match reading.rssi {
            Some(measured) => {
                let predicted = self.model.rssi_dbm(
                    hypothesis.transmitted_power_dbm,
                    hypothesis.path_loss_exponent,
                    distance,
                );
                (predicted - measured).abs()
            },
            None => f64::INFINITY,
        };

        match self.measurements {
            Measurements::Ranging => ranging(),
            Measurements::Rssi => rssi(),
            Measurements::RangingAndRssi => 0.5 * (ranging() + rssi()),
        }
    }
}

impl<const D: usize> ConsensusProblem for PreliminarySolver<'_, D> {
    type Candidate = Hypothesis<D>;

    fn len(&self) -> usize {
        self.readings.len()
    }

    fn subset_size(&self) -> usize {
        self.subset_size
    }

    fn solve(&self, subset: &[usize]) -> Result<Hypothesis<D>, Error> {
        let readings = subset
            .iter()
            .map(|i| &self.readings[*i])
            .collect::<Vec<_>>();

        self.solve_readings(&readings)
    }

    fn residual(&self, candidate: &Hypothesis<D>, index: usize) -> f64 {
        self.reading_residual(candidate, &self.readings[index])
    }
}
