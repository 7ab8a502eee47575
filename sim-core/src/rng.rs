//! Seeded random sampling (§4.5 step 3, §9, A.5).
//!
//! A single generator is threaded through the whole kernel so draws happen in
//! the deterministic order coroutines wake in; this is what makes a run with
//! `random_seed` set bit-identical across runs (§8 property 5).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

pub struct SimRng {
    inner: ChaCha8Rng,
}

impl SimRng {
    pub fn from_seed(seed: Option<u64>) -> Self {
        let inner = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        SimRng { inner }
    }

    /// Sample a task duration (§4.5 step 3): `max(1, N(mean, variance^2))`,
    /// or exactly `mean` when `variance == 0`.
    pub fn sample_duration(&mut self, mean: f64, variance: f64) -> f64 {
        if variance == 0.0 {
            return mean;
        }
        let normal = Normal::new(mean, variance).expect("variance validated non-negative");
        normal.sample(&mut self.inner).max(1.0)
    }

    /// Uniform draw in `[0, 1)`, compared against `rework_prob` (§4.5 step 6).
    pub fn uniform(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }
}
