//! Linear lateration: closed form position solvers from sensor
//! positions and ranging measurements.
use nalgebra::{Point, SVector};

use crate::error::Error;

mod homogeneous;
mod inhomogeneous;

/// Linear lateration solver. Each ranging measurement
/// gives one equation `|p - sᵢ|² = dᵢ²`, that we linearize by
/// adding `|p|²` as an extra unknown.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lateration {
    /// Homogeneous system `A [p, |p|², 1]ᵀ = 0` solved by its null space.
    /// More robust to near degenerate geometries.
    Homogeneous,
    /// Inhomogeneous system `A [p, |p|²]ᵀ = b` solved in the least squares sense.
    /// Fewer operations, expects a well conditioned system.
    #[default]
    Inhomogeneous,
}

impl std::fmt::Display for Lateration {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Homogeneous => write!(f, "homogeneous"),
            Self::Inhomogeneous => write!(f, "inhomogeneous"),
        }
    }
}

/// Coordinates normalization: centered on the sensors centroid,
/// scaled to unit mean distance to the centroid.
struct Normalization<const D: usize> {
    centroid: SVector<f64, D>,
    scale: f64,
}

impl<const D: usize> Normalization<D> {
    fn new(positions: &[Point<f64, D>]) -> Result<Self, Error> {
        let n = positions.len() as f64;

        let centroid = positions
            .iter()
            .fold(SVector::<f64, D>::zeros(), |acc, p| acc + p.coords)
            / n;

        let scale = positions
            .iter()
            .map(|p| (p.coords - centroid).norm())
            .sum::<f64>()
            / n;

        if !(scale > 0.0) || !scale.is_finite() {
            // all sensors are co-located
            return Err(Error::DegenerateGeometry);
        }

        Ok(Self { centroid, scale })
    }

    fn apply(&self, position: &Point<f64, D>) -> SVector<f64, D> {
        (position.coords - self.centroid) / self.scale
    }

    fn revert(&self, normalized: SVector<f64, D>) -> Point<f64, D> {
        Point::from(normalized * self.scale + self.centroid)
    }
}

impl Lateration {
    /// Minimal number of readings to solve a `dim` dimensional position.
    pub fn min_readings(dim: usize) -> usize {
        dim + 1
    }

    /// Solves the position from sensor `positions` and their ranging `distances` (m).
    pub fn solve<const D: usize>(
        &self,
        positions: &[Point<f64, D>],
        distances: &[f64],
    ) -> Result<Point<f64, D>, Error> {
        let size = positions.len().min(distances.len());
        let min_size = Self::min_readings(D);

        if size < min_size {
            return Err(Error::NotEnoughReadings(size, min_size));
        }

        let normalization = Normalization::new(&positions[..size])?;

        let normalized = positions[..size]
            .iter()
            .map(|p| normalization.apply(p))
            .collect::<Vec<_>>();

        let distances = distances[..size]
            .iter()
            .map(|d| d / normalization.scale)
            .collect::<Vec<_>>();

        let solution = match self {
            Self::Homogeneous => homogeneous::solve(&normalized, &distances)?,
            Self::Inhomogeneous => inhomogeneous::solve(&normalized, &distances)?,
        };

        if solution.iter().any(|x| !x.is_finite()) {
            return Err(Error::DegenerateGeometry);
        }

        Ok(normalization.revert(solution))
    }
}
