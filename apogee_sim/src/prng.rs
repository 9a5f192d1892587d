// apogee_sim/src/prng.rs

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// The deterministic pseudo-random number generator behind every harness run.
#[derive(Debug, Clone)]
pub struct SimulationRng(pub ChaCha8Rng);

impl SimulationRng {
    /// Seeded when `seed` is given, otherwise drawn from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self(ChaCha8Rng::seed_from_u64(seed)),
            None => Self(ChaCha8Rng::from_entropy()),
        }
    }

    /// An independent child stream, so separate consumers do not perturb each other.
    pub fn fork(&mut self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0.gen())
    }
}
