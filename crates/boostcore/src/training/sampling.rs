//! Row subsampling for tree growth.
//!
//! Each instance is kept independently with probability `rate`. The
//! generator is owned by the sampler and advances across rounds, so a
//! booster seeded once produces a reproducible sequence of samples without
//! touching any global random state.

use rand::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Bernoulli row sampler with an explicit generator.
#[derive(Debug, Clone)]
pub struct RowSubsampler {
    rate: f32,
    rng: Xoshiro256PlusPlus,
}

impl RowSubsampler {
    /// # Panics
    ///
    /// Panics if `rate` is not in (0, 1].
    pub fn new(rate: f32, seed: u64) -> Self {
        assert!(rate > 0.0 && rate <= 1.0, "rate must be in (0, 1], got {}", rate);
        Self {
            rate,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f32) {
        assert!(rate > 0.0 && rate <= 1.0, "rate must be in (0, 1], got {}", rate);
        self.rate = rate;
    }

    /// Restart the generator from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    }

    /// Returns true if this sampler actually filters rows.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.rate < 1.0
    }

    /// Clear the slots of dropped instances. Already-empty slots stay empty
    /// and do not consume randomness.
    pub fn apply<T>(&mut self, slots: &mut [Option<T>]) {
        if !self.is_enabled() {
            return;
        }
        for slot in slots.iter_mut().filter(|s| s.is_some()) {
            if self.rng.gen::<f32>() >= self.rate {
                *slot = None;
            }
        }
    }
}
