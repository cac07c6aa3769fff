//! Position [Accuracy] derived from a covariance matrix.
use itertools::Itertools;
use nalgebra::{DMatrix, SMatrix, SVector};

use crate::{constants::EPSILON, error::Error};

/// Default standard deviation factor (2σ)
const DEFAULT_STANDARD_DEVIATION_FACTOR: f64 = 2.0;

/// Lanczos approximation (g = 7, n = 9)
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// ln Γ(x), x > 0
fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // reflection
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let t = x + 7.5;

    let sum = LANCZOS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + i as f64));

    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

/// Regularized lower incomplete gamma function P(a, x)
fn regularized_gamma(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }

    let ln_prefactor = a * x.ln() - x - ln_gamma(a);

    if x < a + 1.0 {
        // series
        let mut term = 1.0 / a;
        let mut sum = term;
        let mut n = a;
        for _ in 0..500 {
            n += 1.0;
            term *= x / n;
            sum += term;
            if term.abs() < sum.abs() * 1.0E-15 {
                break;
            }
        }
        (sum.ln() + ln_prefactor).exp().min(1.0)
    } else {
        // continued fraction (modified Lentz) for Q(a, x)
        let tiny = 1.0E-300;
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / tiny;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..500 {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < tiny {
                d = tiny;
            }
            c = b + an / c;
            if c.abs() < tiny {
                c = tiny;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < 1.0E-15 {
                break;
            }
        }
        (1.0 - (ln_prefactor.exp() * h)).max(0.0)
    }
}

/// Probability that a `dof` dimensional normal vector lies within
/// `factor` standard deviations (χ² cumulative distribution of `factor²`).
pub(crate) fn chi_squared_confidence(dof: usize, factor: f64) -> f64 {
    regularized_gamma(dof as f64 / 2.0, factor * factor / 2.0)
}

/// Standard deviation factor reaching this confidence, in `dof` dimensions.
pub(crate) fn chi_squared_factor(dof: usize, confidence: f64) -> f64 {
    let (mut low, mut high) = (0.0_f64, 1.0_f64);

    while chi_squared_confidence(dof, high) < confidence && high < 1.0E3 {
        high *= 2.0;
    }

    for _ in 0..200 {
        let mid = 0.5 * (low + high);
        if chi_squared_confidence(dof, mid) < confidence {
            low = mid;
        } else {
            high = mid;
        }
        if high - low < 1.0E-14 {
            break;
        }
    }

    0.5 * (low + high)
}

/// Position [Accuracy]: uncertainty ellipse (ellipsoid) described by a
/// covariance matrix, scaled to a given confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accuracy<const D: usize> {
    covariance: SMatrix<f64, D, D>,
    /// Standard deviations along the principal axes, ascending
    std_devs: SVector<f64, D>,
    factor: f64,
}

/// Planar [Accuracy]
pub type Accuracy2D = Accuracy<2>;

/// Spatial [Accuracy]
pub type Accuracy3D = Accuracy<3>;

impl<const D: usize> Accuracy<D> {
    /// Builds [Accuracy] from a symmetric positive semi definite covariance (m²).
    pub fn new(covariance: SMatrix<f64, D, D>) -> Result<Self, Error> {
        if covariance.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidCovariance);
        }

        let scale = covariance.amax().max(1.0);

        if !covariance.relative_eq(&covariance.transpose(), EPSILON * scale, EPSILON) {
            return Err(Error::InvalidCovariance);
        }

        let eigenvalues =
            DMatrix::<f64>::from_fn(D, D, |i, j| covariance[(i, j)]).symmetric_eigenvalues();

        if eigenvalues.iter().any(|e| *e < -EPSILON * scale) {
            return Err(Error::InvalidCovariance);
        }

        let sorted = eigenvalues
            .iter()
            .map(|e| e.max(0.0).sqrt())
            .sorted_by(|a, b| a.total_cmp(b))
            .collect::<Vec<_>>();

        Ok(Self {
            covariance,
            std_devs: SVector::<f64, D>::from_iterator(sorted),
            factor: DEFAULT_STANDARD_DEVIATION_FACTOR,
        })
    }

    /// Copies and returns [Accuracy] scaled by this standard deviation factor.
    pub fn with_standard_deviation_factor(&self, factor: f64) -> Result<Self, Error> {
        if !(factor > 0.0) || !factor.is_finite() {
            return Err(Error::InvalidStandardDeviationFactor);
        }
        let mut s = *self;
        s.factor = factor;
        Ok(s)
    }

    /// Copies and returns [Accuracy] scaled to this confidence (]0, 1[).
    pub fn with_confidence(&self, confidence: f64) -> Result<Self, Error> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(Error::InvalidConfidence);
        }
        let mut s = *self;
        s.factor = chi_squared_factor(D, confidence);
        Ok(s)
    }

    /// Covariance matrix (m²)
    pub fn covariance(&self) -> &SMatrix<f64, D, D> {
        &self.covariance
    }

    /// Standard deviation factor in use
    pub fn standard_deviation_factor(&self) -> f64 {
        self.factor
    }

    /// Confidence in use
    pub fn confidence(&self) -> f64 {
        chi_squared_confidence(D, self.factor)
    }

    /// Semi axes of the uncertainty ellipse (ellipsoid), ascending (m)
    pub fn semi_axes(&self) -> SVector<f64, D> {
        self.std_devs * self.factor
    }

    /// Smallest semi axis (m)
    pub fn smallest_accuracy(&self) -> f64 {
        self.semi_axes().min()
    }

    /// Largest semi axis (m)
    pub fn largest_accuracy(&self) -> f64 {
        self.semi_axes().max()
    }

    /// Average semi axis (m)
    pub fn average_accuracy(&self) -> f64 {
        self.semi_axes().mean()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{Matrix2, Matrix3};

    #[test]
    fn gamma() {
        // Γ(5) = 24, Γ(1/2) = √π
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < 1e-12);
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-12);
    }

    #[test]
    fn chi_squared() {
        // 2 dof: 1 - exp(-k²/2)
        for k in [0.5, 1.0, 2.0, 3.0, 5.0] {
            let expected = 1.0 - (-k * k / 2.0_f64).exp();
            assert!((chi_squared_confidence(2, k) - expected).abs() < 1e-12);
        }

        // 3 dof
        assert!((chi_squared_confidence(3, 1.0) - 0.198_748).abs() < 1e-6);
        assert!((chi_squared_confidence(3, 2.0) - 0.738_536).abs() < 1e-6);
        assert!((chi_squared_confidence(3, 3.0) - 0.970_709).abs() < 1e-6);

        for confidence in [0.1, 0.5, 0.95, 0.99] {
            for dof in [1, 2, 3] {
                let factor = chi_squared_factor(dof, confidence);
                assert!((chi_squared_confidence(dof, factor) - confidence).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn planar_accuracy() {
        let accuracy = Accuracy2D::new(Matrix2::new(4.0, 0.0, 0.0, 1.0)).unwrap();
        assert_eq!(accuracy.standard_deviation_factor(), 2.0);
        assert!((accuracy.semi_axes() - SVector::<f64, 2>::new(2.0, 4.0)).norm() < 1e-12);
        assert!((accuracy.smallest_accuracy() - 2.0).abs() < 1e-12);
        assert!((accuracy.largest_accuracy() - 4.0).abs() < 1e-12);
        assert!((accuracy.average_accuracy() - 3.0).abs() < 1e-12);

        let accuracy = accuracy.with_confidence(0.95).unwrap();
        assert!((accuracy.confidence() - 0.95).abs() < 1e-9);
        // √(-2 ln 0.05)
        assert!((accuracy.standard_deviation_factor() - 2.447_746_830_680_816).abs() < 1e-9);

        let accuracy = accuracy.with_standard_deviation_factor(1.0).unwrap();
        assert!((accuracy.confidence() - 0.393_469_340_287_366_6).abs() < 1e-12);
    }

    #[test]
    fn invalid_accuracy() {
        assert_eq!(
            Accuracy2D::new(Matrix2::new(1.0, 0.5, 0.0, 1.0)),
            Err(Error::InvalidCovariance)
        );
        assert_eq!(
            Accuracy3D::new(Matrix3::from_diagonal(&SVector::<f64, 3>::new(1.0, -1.0, 1.0))),
            Err(Error::InvalidCovariance)
        );

        let accuracy = Accuracy3D::new(Matrix3::identity()).unwrap();
        assert_eq!(
            accuracy.with_standard_deviation_factor(0.0),
            Err(Error::InvalidStandardDeviationFactor)
        );
        assert_eq!(accuracy.with_confidence(1.0), Err(Error::InvalidConfidence));
    }
}
