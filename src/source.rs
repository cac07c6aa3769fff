//! Radio sources and located radio sources
use std::collections::HashMap;

use itertools::Itertools;
use nalgebra::{Point, SMatrix};

use crate::{
    constants::DEFAULT_FREQUENCY_HZ, estimator::Estimate, power::PathLoss, reading::Reading,
};

/// Type of radio emitter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RadioSourceKind {
    /// Wi-Fi Access Point, identified by its BSSID
    WifiAccessPoint {
        /// Basic service set identifier (MAC address)
        bssid: String,
        /// Possible network name
        ssid: Option<String>,
    },
    /// BLE beacon, identified by its advertised identifiers
    Beacon {
        /// Advertised identifiers (for example UUID, major, minor)
        identifiers: Vec<String>,
    },
}

/// [RadioSource] identifies the emitter being measured.
/// The estimator only relies on equality, and on the carrier frequency
/// that defines the path loss model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RadioSource {
    /// [RadioSourceKind]
    pub kind: RadioSourceKind,
    /// Carrier frequency in Hz
    pub frequency_hz: u64,
}

impl RadioSource {
    /// Builds a new Wi-Fi Access Point [RadioSource]
    pub fn wifi_access_point(bssid: &str, frequency_hz: u64) -> Self {
        Self {
            frequency_hz,
            kind: RadioSourceKind::WifiAccessPoint {
                bssid: bssid.to_string(),
                ssid: None,
            },
        }
    }

    /// Builds a new beacon [RadioSource], emitting in the 2.4 GHz band.
    pub fn beacon(identifiers: &[&str]) -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            kind: RadioSourceKind::Beacon {
                identifiers: identifiers.iter().map(|id| id.to_string()).collect(),
            },
        }
    }

    /// Copies and returns [RadioSource] with network name. Only applies to
    /// Wi-Fi Access Points.
    pub fn with_ssid(&self, ssid: &str) -> Self {
        let mut s = self.clone();
        if let RadioSourceKind::WifiAccessPoint { ssid: name, .. } = &mut s.kind {
            *name = Some(ssid.to_string());
        }
        s
    }

    /// Copies and returns [RadioSource] with updated carrier frequency (Hz).
    pub fn with_frequency(&self, frequency_hz: u64) -> Self {
        let mut s = self.clone();
        s.frequency_hz = frequency_hz;
        s
    }

    /// Path loss model of this emitter
    pub fn path_loss(&self) -> PathLoss {
        PathLoss::new(self.frequency_hz)
    }

    /// Attaches this [RadioSource] to an estimation result.
    pub fn locate<const D: usize>(&self, estimate: &Estimate<D>) -> LocatedRadioSource<D> {
        LocatedRadioSource {
            source: self.clone(),
            position: estimate.position,
            transmitted_power_dbm: estimate.transmitted_power_dbm,
            path_loss_exponent: estimate.path_loss_exponent,
            position_covariance: estimate.position_covariance(),
            transmitted_power_variance: estimate.transmitted_power_variance(),
            path_loss_exponent_variance: estimate.path_loss_exponent_variance(),
        }
    }
}

impl std::fmt::Display for RadioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.kind {
            RadioSourceKind::WifiAccessPoint { bssid, ssid } => match ssid {
                Some(ssid) => write!(f, "AP({} \"{}\")", bssid, ssid),
                None => write!(f, "AP({})", bssid),
            },
            RadioSourceKind::Beacon { identifiers } => {
                write!(f, "Beacon({})", identifiers.iter().join(":"))
            },
        }
    }
}

/// [RadioSource] with estimated location, and possibly transmitted power
/// and path loss exponent.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedRadioSource<const D: usize> {
    /// [RadioSource]
    pub source: RadioSource,
    /// Estimated position
    pub position: Point<f64, D>,
    /// Transmitted power (dBm), if known
    pub transmitted_power_dbm: Option<f64>,
    /// Path loss exponent, if known
    pub path_loss_exponent: Option<f64>,
    /// Position covariance (m²), if estimated
    pub position_covariance: Option<SMatrix<f64, D, D>>,
    /// Transmitted power variance (dBm²), if estimated
    pub transmitted_power_variance: Option<f64>,
    /// Path loss exponent variance, if estimated
    pub path_loss_exponent_variance: Option<f64>,
}

/// Groups [Reading]s per [RadioSource], preserving the reading order.
pub fn group_by_source<const D: usize>(
    readings: impl IntoIterator<Item = Reading<D>>,
) -> HashMap<RadioSource, Vec<Reading<D>>> {
    readings
        .into_iter()
        .into_group_map_by(|reading| reading.source.clone())
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Point2;

    #[test]
    fn source_identity() {
        let ap = RadioSource::wifi_access_point("bssid", 2_412_000_000);
        assert_eq!(ap, RadioSource::wifi_access_point("bssid", 2_412_000_000));
        assert_ne!(ap, RadioSource::wifi_access_point("other", 2_412_000_000));
        assert_ne!(ap, ap.with_ssid("ssid"));
        assert_eq!(ap.to_string(), "AP(bssid)");
        assert_eq!(ap.with_ssid("home").to_string(), "AP(bssid \"home\")");

        let beacon = RadioSource::beacon(&["uuid", "1", "2"]);
        assert_eq!(beacon.frequency_hz, DEFAULT_FREQUENCY_HZ);
        assert_eq!(beacon.to_string(), "Beacon(uuid:1:2)");
        assert_eq!(beacon.with_ssid("ignored"), beacon);
    }

    #[test]
    fn grouping() {
        let ap1 = RadioSource::wifi_access_point("ap1", DEFAULT_FREQUENCY_HZ);
        let ap2 = RadioSource::wifi_access_point("ap2", DEFAULT_FREQUENCY_HZ);

        let readings = vec![
            Reading::ranging(ap1.clone(), Point2::new(0.0, 0.0), 1.0),
            Reading::ranging(ap2.clone(), Point2::new(1.0, 0.0), 2.0),
            Reading::ranging(ap1.clone(), Point2::new(2.0, 0.0), 3.0),
        ];

        let groups = group_by_source(readings);
        assert_eq!(groups.len(), 2);

        let ap1_readings = groups.get(&ap1).unwrap();
        assert_eq!(ap1_readings.len(), 2);
        assert_eq!(ap1_readings[0].distance, Some(1.0));
        assert_eq!(ap1_readings[1].distance, Some(3.0));

        assert_eq!(groups.get(&ap2).unwrap().len(), 1);
    }
}
