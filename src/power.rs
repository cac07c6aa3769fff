//! Power units and log-distance path loss model.
use std::f64::consts::PI;

use crate::constants::{DEFAULT_FREQUENCY_HZ, SPEED_OF_LIGHT_M_S};

/// Converts power in dBm to linear power in mW.
pub fn dbm_to_power(dbm: f64) -> f64 {
    10.0_f64.powf(dbm / 10.0)
}

/// Converts linear power in mW to dBm.
pub fn power_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

/// Log-distance path loss model. Received power at distance `d` from a
/// source transmitting `Pte` is `Pr = Pte (k / d)ⁿ`, with `k = c / (4πf)`:
/// in logarithmic units `rssi = Pte + 10 n log10(k / d)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathLoss {
    /// Carrier frequency in Hz
    pub frequency_hz: u64,
}

impl Default for PathLoss {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        }
    }
}

impl PathLoss {
    /// Builds [PathLoss] for this carrier frequency (Hz).
    pub fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    /// Wavelength dependent constant `k = c / (4πf)` (m)
    pub fn k(&self) -> f64 {
        SPEED_OF_LIGHT_M_S / (4.0 * PI * self.frequency_hz as f64)
    }

    /// Geometric gain `10 log10(k / d)` (dB), the factor of the path loss exponent.
    pub(crate) fn gain_db(&self, distance: f64) -> f64 {
        10.0 * (self.k() / distance).log10()
    }

    /// Expected RSSI (dBm) at `distance` (m).
    pub fn rssi_dbm(&self, transmitted_power_dbm: f64, path_loss_exponent: f64, distance: f64) -> f64 {
        transmitted_power_dbm + path_loss_exponent * self.gain_db(distance)
    }

    /// Distance (m) at which `rssi_dbm` is expected.
    pub fn distance(&self, transmitted_power_dbm: f64, path_loss_exponent: f64, rssi_dbm: f64) -> f64 {
        self.k() * 10.0_f64.powf((transmitted_power_dbm - rssi_dbm) / (10.0 * path_loss_exponent))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dbm_conversions() {
        assert_eq!(dbm_to_power(0.0), 1.0);
        assert!((dbm_to_power(20.0) - 100.0).abs() < 1e-9);
        assert!((power_to_dbm(1.0E-3) + 30.0).abs() < 1e-9);

        for dbm in [-90.0, -42.5, 0.0, 13.0] {
            assert!((power_to_dbm(dbm_to_power(dbm)) - dbm).abs() < 1e-9);
        }
    }

    #[test]
    fn free_space_model() {
        let model = PathLoss::default();

        // λ = c/f ~ 12.5cm at 2.4GHz
        assert!((model.k() - 0.124913524 / (4.0 * PI)).abs() < 1e-6);

        // free space: -6dB each time distance doubles
        let rssi_1 = model.rssi_dbm(0.0, 2.0, 1.0);
        let rssi_2 = model.rssi_dbm(0.0, 2.0, 2.0);
        assert!((rssi_1 - rssi_2 - 20.0 * 2.0_f64.log10()).abs() < 1e-9);

        let rssi = model.rssi_dbm(-3.0, 2.7, 17.2);
        assert!((model.distance(-3.0, 2.7, rssi) - 17.2).abs() < 1e-9);
    }
}
