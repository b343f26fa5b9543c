//! Occupancy-driven cleanup.
//!
//! When the map holds more than `capacity * (1 - cleanup_threshold)` entries,
//! the excess should go, oldest first. Sorting every timestamp in the map to
//! find the cut-off would cost a full pass plus a sort, so the sweeper
//! estimates it instead:
//!
//! 1. collect up to `max_samples` timestamps, starting at a random segment;
//! 2. scale the excess down to the sample: `k = samples * excess / count`;
//! 3. take the `k`-th oldest sampled timestamp as the cut-off;
//! 4. remove everything at least that old, but never younger than
//!    `min_time_to_live`.

use super::Sweeper;
use crate::clock::current_time_millis;
use crate::codec::Codec;
use crate::map::OffheapMap;
use crate::memory::Allocator;
use crate::segment::CONCURRENCY_LEVEL;
use crate::select::select;
use core::fmt;
use log::{debug, info, log_enabled, Level};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Removes roughly the oldest entries above the occupancy target.
pub struct SamplingSweeper {
    rng: SmallRng,
    samples: Vec<u64>,
}

impl SamplingSweeper {
    /// Creates a sweeper seeded from system entropy.
    pub fn new() -> Self {
        Self::from_rng(SmallRng::from_entropy())
    }

    /// Creates a sweeper with a fixed seed, for reproducible sampling.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(SmallRng::seed_from_u64(seed))
    }

    fn from_rng(rng: SmallRng) -> Self {
        Self {
            rng,
            samples: Vec::new(),
        }
    }
}

impl Default for SamplingSweeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Sweeper for SamplingSweeper {
    fn sweep<C: Codec, A: Allocator>(&mut self, map: &OffheapMap<C, A>) -> usize {
        let entries_to_clean = map.entries_to_clean();
        if entries_to_clean <= 0 {
            return 0;
        }

        self.samples.clear();
        self.samples.resize(map.settings().max_samples(), 0);
        let start = self.rng.gen_range(0..CONCURRENCY_LEVEL);
        let samples = map.collect_samples(&mut self.samples, start);
        if samples == 0 {
            return 0;
        }

        let count = map.len() as i64;
        let k = if entries_to_clean < count {
            (samples as i128 * entries_to_clean as i128 / count as i128) as usize
        } else {
            0
        };
        let sampled = &mut self.samples[..samples];
        let cutoff = select(sampled, k.min(samples - 1));
        let age = current_time_millis().saturating_sub(cutoff);

        info!(
            "need to clean {} entries, samples collected = {}, age = {}",
            entries_to_clean, samples, age
        );
        if log_enabled!(Level::Debug) {
            debug!("samples: {:?}", sampled);
        }

        map.remove_expired(age.max(map.settings().min_time_to_live()))
    }
}

impl fmt::Debug for SamplingSweeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingSweeper")
            .field("samples", &self.samples.len())
            .finish_non_exhaustive()
    }
}
