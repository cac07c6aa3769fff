use nalgebra::{DMatrix, DVector, Point, SVector};

use crate::{
    apriori::Hypothesis, cfg::Measurements, cfg::Targets, constants::EPSILON,
    power::PathLoss, reading::Reading, refine::LeastSquaresProblem,
};

/// Radio source refinement problem. Parameters are stacked as
/// `[position?, transmitted power?, path loss exponent?]` depending on
/// the [Targets]; fixed values are picked up from the `fixed` [Hypothesis].
pub(crate) struct RadioSourceProblem<'a, const D: usize> {
    readings: Vec<&'a Reading<D>>,
    measurements: Measurements,
    targets: Targets,
    model: PathLoss,
    fixed: Hypothesis<D>,
    use_position_covariance: bool,
}

impl<'a, const D: usize> RadioSourceProblem<'a, D> {
    pub fn new(
        readings: Vec<&'a Reading<D>>,
        measurements: Measurements,
        targets: Targets,
        model: PathLoss,
        fixed: Hypothesis<D>,
        use_position_covariance: bool,
    ) -> Self {
        Self {
            readings,
            measurements,
            targets: targets.effective(measurements),
            model,
            fixed,
            use_position_covariance,
        }
    }

    /// Number of parameters
    pub fn unknowns(&self) -> usize {
        self.targets.unknowns(D)
    }

    /// Number of scalar observations
    pub fn observations(&self) -> usize {
        let mut per_reading = 0;
        if self.measurements.uses_ranging() {
            per_reading += 1;
        }
        if self.measurements.uses_rssi() {
            per_reading += 1;
        }
        self.readings.len() * per_reading
    }

    fn power_index(&self) -> Option<usize> {
        if self.targets.transmitted_power {
            Some(if self.targets.position { D } else { 0 })
        } else {
            None
        }
    }

    fn exponent_index(&self) -> Option<usize> {
        if self.targets.path_loss_exponent {
            Some(self.unknowns() - 1)
        } else {
            None
        }
    }

    /// Stacks the unknowns of this [Hypothesis].
    pub fn pack(&self, hypothesis: &Hypothesis<D>) -> DVector<f64> {
        let mut x = DVector::zeros(self.unknowns());
        if self.targets.position {
            for i in 0..D {
                x[i] = hypothesis.position[i];
            }
        }
        if let Some(i) = self.power_index() {
            x[i] = hypothesis.transmitted_power_dbm;
        }
        if let Some(i) = self.exponent_index() {
            x[i] = hypothesis.path_loss_exponent;
        }
        x
    }

    /// Rebuilds a [Hypothesis] from stacked unknowns.
    pub fn unpack(&self, x: &DVector<f64>) -> Hypothesis<D> {
        let mut hypothesis = self.fixed;
        if self.targets.position {
            hypothesis.position = Point::from(SVector::<f64, D>::from_iterator(
                x.iter().take(D).copied(),
            ));
        }
        if let Some(i) = self.power_index() {
            hypothesis.transmitted_power_dbm = x[i];
        }
        if let Some(i) = self.exponent_index() {
            hypothesis.path_loss_exponent = x[i];
        }
        hypothesis
    }

    /// Variance contributed by the sensor position uncertainty,
    /// for a residual whose sensitivity to the sensor position is `g`.
    fn position_variance(&self, reading: &Reading<D>, g: &SVector<f64, D>) -> f64 {
        if !self.use_position_covariance {
            return 0.0;
        }
        match &reading.position_covariance {
            Some(cov) => (g.transpose() * cov * g)[(0, 0)].max(0.0),
            None => 0.0,
        }
    }
}

impl<const D: usize> LeastSquaresProblem for RadioSourceProblem<'_, D> {
    fn evaluate(&self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
        let hypothesis = self.unpack(x);

        let nrows = self.observations();
        let ncols = self.unknowns();

        let mut residuals = DVector::<f64>::zeros(nrows);
        let mut jacobian = DMatrix::<f64>::zeros(nrows, ncols);

        let power_index = self.power_index();
        let exponent_index = self.exponent_index();

        let mut row = 0;

        for reading in self.readings.iter() {
            let diff = hypothesis.position - reading.position;
            let distance = diff.norm();

            // unit vector from sensor to source
            let unit = if distance > EPSILON {
                diff / distance
            } else {
                SVector::<f64, D>::zeros()
            };

            if self.measurements.uses_ranging() {
                let measured = reading.distance?;

                // ∂r/∂s = -∂r/∂p
                let sigma2 = reading.distance_sigma().powi(2)
                    + self.position_variance(reading, &unit);
                let weight = 1.0 / sigma2.sqrt();

                residuals[row] = (distance - measured) * weight;

                if self.targets.position {
                    for i in 0..D {
                        jacobian[(row, i)] = unit[i] * weight;
                    }
                }
                row += 1;
            }

            if self.measurements.uses_rssi() {
                let measured = reading.rssi?;

                if !(distance > EPSILON) {
                    // model is singular on the sensor
                    return None;
                }

                let gain = self.model.gain_db(distance);
                let predicted = hypothesis.transmitted_power_dbm + hypothesis.path_loss_exponent * gain;

                // ∂gain/∂p = -10 / (ln10 d) u
                let dgain = -10.0 / (std::f64::consts::LN_10 * distance) * unit;
                let grad = dgain * hypothesis.path_loss_exponent;

                let sigma2 = reading.rssi_sigma().powi(2) + self.position_variance(reading, &grad);
                let weight = 1.0 / sigma2.sqrt();

                residuals[row] = (predicted - measured) * weight;

                if self.targets.position {
                    for i in 0..D {
                        jacobian[(row, i)] = grad[i] * weight;
                    }
                }
                if let Some(i) = power_index {
                    jacobian[(row, i)] = weight;
                }
                if let Some(i) = exponent_index {
                    jacobian[(row, i)] = gain * weight;
                }
                row += 1;
            }
        }

        if residuals.iter().any(|r| !r.is_finite()) {
            return None;
        }

        Some((residuals, jacobian))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{refine::LevenbergMarquardt, source::RadioSource};
    use nalgebra::{Matrix2, Point2};

    fn sensors() -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(0.0, 10.0),
            Point2::new(10.0, 10.0),
            Point2::new(5.0, -3.0),
        ]
    }

    #[test]
    fn pack_unpack() {
        let readings = vec![];
        let fixed = Hypothesis {
            position: Point2::new(1.0, 2.0),
            transmitted_power_dbm: -3.0,
            path_loss_exponent: 2.0,
        };

        let problem = RadioSourceProblem::new(
            readings,
            Measurements::Rssi,
            Targets::default().with_position(false).with_path_loss_exponent(true),
            PathLoss::default(),
            fixed,
            true,
        );

        assert_eq!(problem.unknowns(), 2);

        let x = problem.pack(&Hypothesis {
            position: Point2::new(7.0, 7.0),
            transmitted_power_dbm: 5.0,
            path_loss_exponent: 2.5,
        });
        assert_eq!(x.as_slice(), &[5.0, 2.5]);

        let unpacked = problem.unpack(&x);
        assert_eq!(unpacked.position, Point2::new(1.0, 2.0));
        assert_eq!(unpacked.transmitted_power_dbm, 5.0);
        assert_eq!(unpacked.path_loss_exponent, 2.5);
    }

    #[test]
    fn rssi_position_and_power() {
        let model = PathLoss::default();
        let source = Point2::new(3.0, 4.0);
        let ap = RadioSource::wifi_access_point("00:11:22:33:44:55", model.frequency_hz);

        let readings = sensors()
            .iter()
            .map(|s| {
                let rssi = model.rssi_dbm(-5.0, 2.0, (s - source).norm());
                Reading::rssi(ap.clone(), *s, rssi)
            })
            .collect::<Vec<_>>();

        let fixed = Hypothesis {
            position: Point2::new(5.0, 5.0),
            transmitted_power_dbm: 0.0,
            path_loss_exponent: 2.0,
        };

        let problem = RadioSourceProblem::new(
            readings.iter().collect(),
            Measurements::Rssi,
            Targets::default(),
            model,
            fixed,
            true,
        );

        let minimum = LevenbergMarquardt::default()
            .minimize(&problem, problem.pack(&fixed))
            .unwrap();

        let solved = problem.unpack(&minimum.x);
        assert!((solved.position - source).norm() < 1e-6);
        assert!((solved.transmitted_power_dbm + 5.0).abs() < 1e-6);
    }

    #[test]
    fn position_covariance_widens_weights() {
        let source = Point2::new(3.0, 4.0);
        let ap = RadioSource::wifi_access_point("00:11:22:33:44:55", 2_400_000_000);

        let readings = sensors()
            .iter()
            .map(|s| {
                Reading::ranging(ap.clone(), *s, (s - source).norm() + 0.5)
                    .with_distance_std_dev(1.0)
                    .with_position_covariance(Matrix2::identity() * 3.0)
            })
            .collect::<Vec<_>>();

        let fixed = Hypothesis {
            position: source,
            transmitted_power_dbm: 0.0,
            path_loss_exponent: 2.0,
        };

        let residuals = |used: bool| {
            let problem = RadioSourceProblem::new(
                readings.iter().collect(),
                Measurements::Ranging,
                Targets::position_only(),
                PathLoss::default(),
                fixed,
                used,
            );
            problem.evaluate(&problem.pack(&fixed)).unwrap().0
        };

        let plain = residuals(false);
        let weighted = residuals(true);

        for (plain, weighted) in plain.iter().zip(weighted.iter()) {
            // measured ranges exceed the predicted ones
            assert!((plain + 0.5).abs() < 1e-12);
            // σ² = 1 + 3
            assert!((weighted + 0.25).abs() < 1e-12);
        }
    }
}
