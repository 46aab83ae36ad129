//! Seeded Gaussian noise owned by a single inference call

use burn::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Source of standard normal noise for latent initialization and stochastic steps
///
/// Each call owns its generator, so two calls with the same seed draw the
/// same sequence regardless of what else runs in the process.
pub struct NoiseGenerator {
    rng: StdRng,
    seed: Option<u64>,
}

impl NoiseGenerator {
    /// Create a generator with a fixed seed
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Create a generator seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    /// Seeded when `seed` is set, entropy otherwise
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }

    /// The seed this generator was created with, if any
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Draw a tensor of i.i.d. N(0, 1) samples
    pub fn normal<B: Backend, const D: usize>(
        &mut self,
        shape: [usize; D],
        device: &B::Device,
    ) -> Tensor<B, D> {
        let len: usize = shape.iter().product();
        let values: Vec<f32> = (0..len)
            .map(|_| self.rng.sample::<f32, _>(StandardNormal))
            .collect();
        Tensor::from_data(TensorData::new(values, shape), device)
    }
}
