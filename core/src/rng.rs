//! Deterministic random number generation for bot bidders.
//!
//! RULE: Nothing in the game may call any platform RNG.
//! All randomness flows through StreamRng instances derived
//! from a single master seed.
//!
//! Each team gets its own stream, seeded from
//! (master_seed XOR team_id * golden ratio). Adding a team never changes
//! the bids of existing teams.

use crate::types::TeamId;
use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct StreamRng {
    inner: Pcg64Mcg,
}

impl StreamRng {
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform integer in [lo, hi]. Returns `lo` when the range is empty.
    pub fn between(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        self.inner.gen_range(lo..=hi)
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn for_team(&self, team_id: TeamId) -> StreamRng {
        StreamRng::new(self.master_seed, team_id as u64)
    }
}
