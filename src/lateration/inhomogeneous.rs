use nalgebra::{DMatrix, DVector, SVector};

use crate::{constants::EPSILON, error::Error};

/// Solves `[-2sᵢᵀ, 1] [p, |p|²]ᵀ = dᵢ² - |sᵢ|²` in the least squares sense.
pub(crate) fn solve<const D: usize>(
    positions: &[SVector<f64, D>],
    distances: &[f64],
) -> Result<SVector<f64, D>, Error> {
    let size = positions.len();

    let mut a = DMatrix::<f64>::zeros(size, D + 1);
    let mut b = DVector::<f64>::zeros(size);

    for (i, (s_i, d_i)) in positions.iter().zip(distances.iter()).enumerate() {
        for j in 0..D {
            a[(i, j)] = -2.0 * s_i[j];
        }
        a[(i, D)] = 1.0;
        b[i] = d_i * d_i - s_i.norm_squared();
    }

    let svd = a.svd(true, true);
    let eps = svd.singular_values.max() * EPSILON;

    if svd.rank(eps) < D + 1 {
        return Err(Error::DegenerateGeometry);
    }

    let x = svd.solve(&b, eps).map_err(|_| Error::DegenerateGeometry)?;

    Ok(SVector::<f64, D>::from_iterator(x.iter().take(D).copied()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn planar_intersection() {
        let positions = [
            SVector::<f64, 2>::new(0.0, 0.0),
            SVector::<f64, 2>::new(1.0, 0.0),
            SVector::<f64, 2>::new(0.0, 1.0),
        ];
        let source = SVector::<f64, 2>::new(0.3, 0.4);
        let distances = positions
            .iter()
            .map(|s| (s - source).norm())
            .collect::<Vec<_>>();

        let solved = solve(&positions, &distances).unwrap();
        assert!((solved - source).norm() < 1e-9);
    }

    #[test]
    fn collinear_sensors() {
        let positions = [
            SVector::<f64, 2>::new(-1.0, 0.0),
            SVector::<f64, 2>::new(0.0, 0.0),
            SVector::<f64, 2>::new(1.0, 0.0),
        ];
        assert_eq!(
            solve(&positions, &[1.0, 1.0, 1.0]),
            Err(Error::DegenerateGeometry)
        );
    }
}
