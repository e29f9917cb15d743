//! Seeded random source for one simulation run.
//!
//! Every random draw of a run goes through one [`SimRng`] constructed from the
//! run's seed. It is owned by the engine and lent to components by `&mut`, so
//! independent runs in the same process (parallel tests, sweeps) never share
//! state.

use rand::distr::Distribution;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random number generator.
///
/// Uses ChaCha8Rng for reproducible randomness: the same seed always yields
/// the same sequence of draws.
#[derive(Debug, Clone)]
pub struct SimRng {
    rng: ChaCha8Rng,
    seed: u64,
    draws: u64,
}

impl SimRng {
    /// Creates a generator seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            draws: 0,
        }
    }

    /// The seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of draws taken so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Uniform f64 in `[0, 1)`.
    pub fn random_f64(&mut self) -> f64 {
        self.draws += 1;
        self.rng.random::<f64>()
    }

    /// `true` with the given probability (clamped to `[0, 1]`).
    pub fn random_bool(&mut self, probability: f64) -> bool {
        self.random_f64() < probability.clamp(0.0, 1.0)
    }

    /// Uniform f64 in `[min, max]`. Returns `min` for an empty range.
    pub fn random_between(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        min + (max - min) * self.random_f64()
    }

    /// Draws from a `rand` distribution.
    pub fn sample<D: Distribution<f64>>(&mut self, distribution: &D) -> f64 {
        self.draws += 1;
        distribution.sample(&mut self.rng)
    }
}
