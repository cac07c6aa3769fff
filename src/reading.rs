//! Sensor readings
use nalgebra::{Point, SMatrix};

use crate::{
    cfg::Measurements,
    constants::{EPSILON, FALLBACK_DISTANCE_STD_DEV, FALLBACK_RSSI_STD_DEV},
    error::Error,
    source::RadioSource,
};

/// [Reading] describes one measurement of a [RadioSource],
/// sampled by a sensor located at a known position.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading<const D: usize> {
    /// Measured [RadioSource]
    pub source: RadioSource,
    /// Position of the sensor
    pub position: Point<f64, D>,
    /// Ranging measurement (m)
    pub distance: Option<f64>,
    /// Received signal strength (dBm)
    pub rssi: Option<f64>,
    /// Sensor position uncertainty (m²)
    pub position_covariance: Option<SMatrix<f64, D, D>>,
    /// Ranging standard deviation (m)
    pub distance_std_dev: Option<f64>,
    /// RSSI standard deviation (dB)
    pub rssi_std_dev: Option<f64>,
}

/// Planar [Reading]
pub type Reading2D = Reading<2>;

/// Spatial [Reading]
pub type Reading3D = Reading<3>;

impl<const D: usize> Reading<D> {
    fn new(source: RadioSource, position: Point<f64, D>) -> Self {
        Self {
            source,
            position,
            distance: None,
            rssi: None,
            position_covariance: None,
            distance_std_dev: None,
            rssi_std_dev: None,
        }
    }

    /// Builds a ranging [Reading], `distance` in meters.
    pub fn ranging(source: RadioSource, position: Point<f64, D>, distance: f64) -> Self {
        let mut s = Self::new(source, position);
        s.distance = Some(distance);
        s
    }

    /// Builds a RSSI [Reading], `rssi` in dBm.
    pub fn rssi(source: RadioSource, position: Point<f64, D>, rssi: f64) -> Self {
        let mut s = Self::new(source, position);
        s.rssi = Some(rssi);
        s
    }

    /// Builds a [Reading] that carries both ranging (m) and RSSI (dBm) measurements.
    pub fn ranging_and_rssi(
        source: RadioSource,
        position: Point<f64, D>,
        distance: f64,
        rssi: f64,
    ) -> Self {
        let mut s = Self::new(source, position);
        s.distance = Some(distance);
        s.rssi = Some(rssi);
        s
    }

    /// Copies and returns [Reading] with sensor position covariance (m²).
    pub fn with_position_covariance(&self, covariance: SMatrix<f64, D, D>) -> Self {
        let mut s = self.clone();
        s.position_covariance = Some(covariance);
        s
    }

    /// Copies and returns [Reading] with ranging standard deviation (m).
    pub fn with_distance_std_dev(&self, std_dev: f64) -> Self {
        let mut s = self.clone();
        s.distance_std_dev = Some(std_dev);
        s
    }

    /// Copies and returns [Reading] with RSSI standard deviation (dB).
    pub fn with_rssi_std_dev(&self, std_dev: f64) -> Self {
        let mut s = self.clone();
        s.rssi_std_dev = Some(std_dev);
        s
    }

    pub(crate) fn distance_sigma(&self) -> f64 {
        self.distance_std_dev.unwrap_or(FALLBACK_DISTANCE_STD_DEV)
    }

    pub(crate) fn rssi_sigma(&self) -> f64 {
        self.rssi_std_dev.unwrap_or(FALLBACK_RSSI_STD_DEV)
    }

    /// Verifies this [Reading], found at `index`, is compatible with
    /// the [Measurements] we intend to use.
    pub(crate) fn validate(&self, index: usize, measurements: Measurements) -> Result<(), Error> {
        if measurements.uses_ranging() {
            match self.distance {
                None => return Err(Error::MissingDistance(index)),
                Some(d) if !d.is_finite() || d < 0.0 => return Err(Error::InvalidDistance(index)),
                _ => {},
            }
        }

        if measurements.uses_rssi() {
            match self.rssi {
                None => return Err(Error::MissingRssi(index)),
                Some(rssi) if !rssi.is_finite() => return Err(Error::InvalidRssi(index)),
                _ => {},
            }
        }

        for sigma in [self.distance_std_dev, self.rssi_std_dev].into_iter().flatten() {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(Error::InvalidStandardDeviation(index));
            }
        }

        if let Some(covariance) = &self.position_covariance {
            if !is_symmetric_positive_definite(covariance) {
                return Err(Error::InvalidPositionCovariance(index));
            }
        }

        Ok(())
    }
}

pub(crate) fn is_symmetric<const D: usize>(mat: &SMatrix<f64, D, D>) -> bool {
    let scale = mat.abs().max().max(1.0);
    (mat - mat.transpose()).abs().max() <= EPSILON * scale
}

fn is_symmetric_positive_definite<const D: usize>(mat: &SMatrix<f64, D, D>) -> bool {
    is_symmetric(mat) && mat.iter().all(|v| v.is_finite()) && mat.cholesky().is_some()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::DEFAULT_FREQUENCY_HZ;
    use nalgebra::{Matrix2, Point2, Point3};

    fn source() -> RadioSource {
        RadioSource::wifi_access_point("00:11:22:33:44:55", DEFAULT_FREQUENCY_HZ)
    }

    #[test]
    fn reading_validation() {
        let ranging = Reading::ranging(source(), Point2::new(1.0, 2.0), 3.0);
        assert!(ranging.validate(0, Measurements::Ranging).is_ok());
        assert_eq!(
            ranging.validate(4, Measurements::Rssi),
            Err(Error::MissingRssi(4))
        );
        assert_eq!(
            ranging.validate(2, Measurements::RangingAndRssi),
            Err(Error::MissingRssi(2))
        );

        let rssi = Reading::rssi(source(), Point3::new(1.0, 2.0, 3.0), -50.0);
        assert!(rssi.validate(0, Measurements::Rssi).is_ok());
        assert_eq!(
            rssi.validate(1, Measurements::Ranging),
            Err(Error::MissingDistance(1))
        );

        let both = Reading::ranging_and_rssi(source(), Point2::new(1.0, 2.0), 3.0, -60.0);
        for measurements in [
            Measurements::Ranging,
            Measurements::Rssi,
            Measurements::RangingAndRssi,
        ] {
            assert!(both.validate(0, measurements).is_ok());
        }

        let negative = Reading::ranging(source(), Point2::new(1.0, 2.0), -3.0);
        assert_eq!(
            negative.validate(0, Measurements::Ranging),
            Err(Error::InvalidDistance(0))
        );

        let nan = Reading::rssi(source(), Point2::new(1.0, 2.0), f64::NAN);
        assert_eq!(nan.validate(0, Measurements::Rssi), Err(Error::InvalidRssi(0)));

        let sigma = ranging.with_distance_std_dev(0.0);
        assert_eq!(
            sigma.validate(3, Measurements::Ranging),
            Err(Error::InvalidStandardDeviation(3))
        );
    }

    #[test]
    fn position_covariance_validation() {
        let reading = Reading::ranging(source(), Point2::new(1.0, 2.0), 3.0);

        let valid = reading.with_position_covariance(Matrix2::new(1.0, 0.2, 0.2, 2.0));
        assert!(valid.validate(0, Measurements::Ranging).is_ok());

        let asymmetric = reading.with_position_covariance(Matrix2::new(1.0, 0.5, 0.2, 2.0));
        assert_eq!(
            asymmetric.validate(0, Measurements::Ranging),
            Err(Error::InvalidPositionCovariance(0))
        );

        let not_definite = reading.with_position_covariance(Matrix2::new(1.0, 2.0, 2.0, 1.0));
        assert_eq!(
            not_definite.validate(0, Measurements::Ranging),
            Err(Error::InvalidPositionCovariance(0))
        );
    }
}
