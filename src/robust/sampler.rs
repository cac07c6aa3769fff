use itertools::Itertools;
use rand::{rngs::SmallRng, seq::index};

/// Subset [Sampler]
pub(crate) enum Sampler {
    /// Uniform draws among all samples
    Uniform { size: usize, subset_size: usize },
    /// Progressive draws among the best quality samples
    Progressive(Progressive),
}

impl Sampler {
    pub fn uniform(size: usize, subset_size: usize) -> Self {
        Self::Uniform { size, subset_size }
    }

    pub fn progressive(quality_scores: &[f64], subset_size: usize, max_iterations: usize) -> Self {
        Self::Progressive(Progressive::new(quality_scores, subset_size, max_iterations))
    }

    /// Draws the next subset (sample indices)
    pub fn sample(&mut self, rng: &mut SmallRng) -> Vec<usize> {
        match self {
            Self::Uniform { size, subset_size } => index::sample(rng, *size, *subset_size).into_vec(),
            Self::Progressive(progressive) => progressive.sample(rng),
        }
    }

    /// Sample indices sorted by decreasing quality, when sampling progressively
    pub fn order(&self) -> Option<&[usize]> {
        match self {
            Self::Uniform { .. } => None,
            Self::Progressive(progressive) => Some(progressive.order.as_slice()),
        }
    }
}

/// PROSAC progressive sampler (Chum & Matas, 2005). Subsets are first drawn
/// among the top quality samples, the pool grows as iterations go by,
/// until it reaches all samples.
pub(crate) struct Progressive {
    /// Sample indices, by decreasing quality
    order: Vec<usize>,
    subset_size: usize,
    /// Current pool size
    n: usize,
    /// Iteration counter
    t: usize,
    /// Average number of subsets drawn from the n best samples
    t_n: f64,
    /// Iteration at which the pool grows
    t_n_prime: usize,
}

impl Progressive {
    pub fn new(quality_scores: &[f64], subset_size: usize, max_iterations: usize) -> Self {
        let size = quality_scores.len();

        // stable: ties keep their input order
        let order = (0..size)
            .sorted_by(|i, j| quality_scores[*j].total_cmp(&quality_scores[*i]))
            .collect::<Vec<_>>();

        // T_m = T_N C(m, m) / C(N, m)
        let mut t_n = max_iterations as f64;
        for i in 0..subset_size {
            t_n *= (subset_size - i) as f64 / (size - i) as f64;
        }

        Self {
            order,
            subset_size,
            n: subset_size,
            t: 0,
            t_n,
            t_n_prime: 1,
        }
    }

    fn grow(&mut self) {
        let next = self.t_n * (self.n + 1) as f64 / (self.n + 1 - self.subset_size) as f64;
        self.t_n_prime += (next - self.t_n).ceil().max(1.0) as usize;
        self.t_n = next;
        self.n += 1;
    }

    pub fn sample(&mut self, rng: &mut SmallRng) -> Vec<usize> {
        self.t += 1;

        while self.t > self.t_n_prime && self.n < self.order.len() {
            self.grow();
        }

        let positions = if self.t_n_prime < self.t || self.n == self.subset_size {
            // draw from the whole pool
            index::sample(rng, self.n, self.subset_size).into_vec()
        } else {
            // n-th sample is always drawn
            let mut positions = index::sample(rng, self.n - 1, self.subset_size - 1).into_vec();
            positions.push(self.n - 1);
            positions
        };

        positions.into_iter().map(|i| self.order[i]).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn uniform_subsets() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut sampler = Sampler::uniform(10, 4);
        for _ in 0..100 {
            let subset = sampler.sample(&mut rng);
            assert_eq!(subset.len(), 4);
            assert!(subset.iter().all(|i| *i < 10));
            assert_eq!(subset.iter().unique().count(), 4);
        }
        assert!(sampler.order().is_none());
    }

    #[test]
    fn progressive_subsets() {
        let mut rng = SmallRng::seed_from_u64(0);
        let scores = [0.1, 0.9, 0.5, 0.8, 0.2, 0.7, 0.3, 0.6, 0.4, 1.0];
        let mut sampler = Sampler::progressive(&scores, 3, 1000);

        assert_eq!(
            sampler.order(),
            Some(&[9, 1, 3, 5, 7, 2, 8, 6, 4, 0][..])
        );

        // first subset is made of the best samples
        let mut first = sampler.sample(&mut rng);
        first.sort();
        assert_eq!(first, vec![1, 3, 9]);

        let mut seen = vec![false; scores.len()];
        for _ in 0..1000 {
            let subset = sampler.sample(&mut rng);
            assert_eq!(subset.iter().unique().count(), 3);
            for i in subset {
                seen[i] = true;
            }
        }

        // pool eventually covers all samples
        assert!(seen.iter().all(|seen| *seen));
    }
}
