//! Closed form transmitted power and path loss exponent fit,
//! at a known radio source position.
use nalgebra::Point;

use crate::{constants::EPSILON, error::Error, power::PathLoss};

/// Transmitted power and path loss exponent, either
/// fitted or forwarded when they were fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PowerFit {
    pub transmitted_power_dbm: f64,
    pub path_loss_exponent: f64,
}

/// Fits `rssiᵢ = P + n gᵢ`, with `gᵢ = 10 log10(k / dᵢ)` and `dᵢ`
/// the distance between `source` and each sensor.
/// - `transmitted_power_dbm`: None when P is to be fitted, fixed value otherwise.
/// - `path_loss_exponent`: None when n is to be fitted, fixed value otherwise.
pub(crate) fn fit<'a, const D: usize>(
    model: &PathLoss,
    source: &Point<f64, D>,
    samples: impl Iterator<Item = (&'a Point<f64, D>, f64)>,
    transmitted_power_dbm: Option<f64>,
    path_loss_exponent: Option<f64>,
) -> Result<PowerFit, Error> {
    let mut gains = Vec::new();
    let mut rssi = Vec::new();

    for (sensor, rssi_dbm) in samples {
        let distance = (sensor - source).norm();
        if !(distance > EPSILON) {
            // sensor and source coincide: no gain
            return Err(Error::DegenerateGeometry);
        }
        gains.push(model.gain_db(distance));
        rssi.push(rssi_dbm);
    }

    let size = gains.len();

    match (transmitted_power_dbm, path_loss_exponent) {
        (Some(p), Some(n)) => Ok(PowerFit {
            transmitted_power_dbm: p,
            path_loss_exponent: n,
        }),
        (None, Some(n)) => {
            if size == 0 {
                return Err(Error::NotEnoughReadings(0, 1));
            }
            let p = gains
                .iter()
                .zip(rssi.iter())
                .map(|(g, y)| y - n * g)
                .sum::<f64>()
                / size as f64;

            Ok(PowerFit {
                transmitted_power_dbm: p,
                path_loss_exponent: n,
            })
        },
        (Some(p), None) => {
            let den = gains.iter().map(|g| g * g).sum::<f64>();
            if !(den > EPSILON) {
                return Err(Error::DegenerateGeometry);
            }
            let num = gains
                .iter()
                .zip(rssi.iter())
                .map(|(g, y)| g * (y - p))
                .sum::<f64>();

            Ok(PowerFit {
                transmitted_power_dbm: p,
                path_loss_exponent: num / den,
            })
        },
        (None, None) => {
            if size < 2 {
                return Err(Error::NotEnoughReadings(size, 2));
            }

            let mean_g = gains.iter().sum::<f64>() / size as f64;
            let mean_y = rssi.iter().sum::<f64>() / size as f64;

            let var_g = gains.iter().map(|g| (g - mean_g).powi(2)).sum::<f64>();
            let scale = gains.iter().map(|g| g * g).sum::<f64>().max(1.0);

            if var_g <= scale * EPSILON {
                // all sensors are at the same distance: P and n are not separable
                return Err(Error::DegenerateGeometry);
            }

            let cov_gy = gains
                .iter()
                .zip(rssi.iter())
                .map(|(g, y)| (g - mean_g) * (y - mean_y))
                .sum::<f64>();

            let n = cov_gy / var_g;

            Ok(PowerFit {
                transmitted_power_dbm: mean_y - n * mean_g,
                path_loss_exponent: n,
            })
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Point2;

    fn samples(model: &PathLoss, source: &Point2<f64>, p: f64, n: f64) -> Vec<(Point2<f64>, f64)> {
        [(1.0, 2.0), (-3.0, 4.5), (7.0, -1.0), (0.5, 9.0)]
            .iter()
            .map(|(x, y)| {
                let sensor = Point2::new(*x, *y);
                let rssi = model.rssi_dbm(p, n, (sensor - source).norm());
                (sensor, rssi)
            })
            .collect()
    }

    #[test]
    fn power_and_exponent() {
        let model = PathLoss::default();
        let source = Point2::new(2.0, 3.0);
        let samples = samples(&model, &source, -10.0, 2.3);

        let fitted = fit(
            &model,
            &source,
            samples.iter().map(|(s, y)| (s, *y)),
            None,
            None,
        )
        .unwrap();

        assert!((fitted.transmitted_power_dbm + 10.0).abs() < 1e-9);
        assert!((fitted.path_loss_exponent - 2.3).abs() < 1e-9);
    }

    #[test]
    fn single_unknown() {
        let model = PathLoss::default();
        let source = Point2::new(-1.0, 0.5);
        let samples = samples(&model, &source, 3.0, 1.8);

        let power = fit(
            &model,
            &source,
            samples.iter().map(|(s, y)| (s, *y)),
            None,
            Some(1.8),
        )
        .unwrap();
        assert!((power.transmitted_power_dbm - 3.0).abs() < 1e-9);
        assert_eq!(power.path_loss_exponent, 1.8);

        let exponent = fit(
            &model,
            &source,
            samples.iter().map(|(s, y)| (s, *y)),
            Some(3.0),
            None,
        )
        .unwrap();
        assert_eq!(exponent.transmitted_power_dbm, 3.0);
        assert!((exponent.path_loss_exponent - 1.8).abs() < 1e-9);
    }

    #[test]
    fn degenerate_fits() {
        let model = PathLoss::default();
        let source = Point2::new(0.0, 0.0);

        // equidistant sensors
        let sensors = [
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(-1.0, 0.0),
        ];
        assert_eq!(
            fit(
                &model,
                &source,
                sensors.iter().map(|s| (s, -40.0)),
                None,
                None
            ),
            Err(Error::DegenerateGeometry)
        );

        // sensor located on the source
        let sensors = [Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)];
        assert_eq!(
            fit(
                &model,
                &source,
                sensors.iter().map(|s| (s, -40.0)),
                None,
                Some(2.0)
            ),
            Err(Error::DegenerateGeometry)
        );
    }
}
