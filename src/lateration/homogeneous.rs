use itertools::Itertools;
use nalgebra::{DMatrix, SVector};

use crate::error::Error;

/// Relative tolerance on the eigenvalues of AᵀA
/// (squared singular values of A).
const NULL_SPACE_TOLERANCE: f64 = 1.0E-12;

/// Solves `[-2sᵢᵀ, 1, |sᵢ|² - dᵢ²] λ[p, |p|², 1]ᵀ = 0`.
/// The solution is the (unique) null vector of A, that is
/// the eigenvector of AᵀA associated to the smallest eigenvalue.
pub(crate) fn solve<const D: usize>(
    positions: &[SVector<f64, D>],
    distances: &[f64],
) -> Result<SVector<f64, D>, Error> {
    let size = positions.len();
    let ncols = D + 2;

    let mut a = DMatrix::<f64>::zeros(size, ncols);

    for (i, (s_i, d_i)) in positions.iter().zip(distances.iter()).enumerate() {
        for j in 0..D {
            a[(i, j)] = -2.0 * s_i[j];
        }
        a[(i, D)] = 1.0;
        a[(i, D + 1)] = s_i.norm_squared() - d_i * d_i;
    }

    let ata = a.transpose() * &a;
    let eigen = ata.symmetric_eigen();

    let order = (0..ncols)
        .sorted_by(|i, j| eigen.eigenvalues[*i].total_cmp(&eigen.eigenvalues[*j]))
        .collect::<Vec<_>>();

    let largest = eigen.eigenvalues[order[ncols - 1]];
    let second = eigen.eigenvalues[order[1]];

    if !(largest > 0.0) || second <= largest * NULL_SPACE_TOLERANCE {
        // null space is not one dimensional
        return Err(Error::DegenerateGeometry);
    }

    let h = eigen.eigenvectors.column(order[0]);
    let w = h[D + 1];

    if w.abs() < f64::EPSILON {
        // solution at infinity
        return Err(Error::DegenerateGeometry);
    }

    Ok(SVector::<f64, D>::from_iterator(
        h.iter().take(D).map(|x| x / w),
    ))
}
