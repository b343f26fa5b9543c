//! Synthetic traffic for the simulator
//!
//! Each worker draws its operations from its own seeded stream, so a run is
//! reproducible for a given seed and thread count. Keys are split into a
//! popular set and a regular set; a configurable share of traffic hits the
//! popular set.

use crate::models::WorkloadConfig;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// One map operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read a key
    Get(u64),
    /// Write a value of the given size
    Put(u64, usize),
}

/// Operation stream for a single worker
#[derive(Debug)]
pub struct Workload {
    rng: SmallRng,
    popular_keys: u64,
    regular_keys: u64,
    read_percent: u8,
    popular_traffic_percent: u8,
    min_value_size: usize,
    max_value_size: usize,
}

impl Workload {
    /// Create the stream for worker `worker`
    pub fn new(config: &WorkloadConfig, worker: usize) -> Self {
        let keys = config.keys.max(1);
        let popular_keys = (keys * u64::from(config.popular_keys_percent.min(100)) / 100).max(1);
        let regular_keys = keys.saturating_sub(popular_keys);
        let max_value_size = config.max_value_size.max(config.min_value_size);

        Self {
            rng: SmallRng::seed_from_u64(config.seed ^ (worker as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            popular_keys,
            regular_keys,
            read_percent: config.read_percent.min(100),
            popular_traffic_percent: config.popular_traffic_percent.min(100),
            min_value_size: config.min_value_size,
            max_value_size,
        }
    }

    /// Draw a key: popular keys are `0..popular_keys`, the rest follow them
    pub fn next_key(&mut self) -> u64 {
        if self.regular_keys == 0 || self.rng.gen_range(0..100) < self.popular_traffic_percent {
            self.rng.gen_range(0..self.popular_keys)
        } else {
            self.popular_keys + self.rng.gen_range(0..self.regular_keys)
        }
    }

    /// Draw a value size
    pub fn next_value_size(&mut self) -> usize {
        self.rng.gen_range(self.min_value_size..=self.max_value_size)
    }

    /// Largest value this stream produces
    pub fn max_value_size(&self) -> usize {
        self.max_value_size
    }

    /// Draw the next operation
    pub fn next_operation(&mut self) -> Operation {
        let key = self.next_key();
        if self.rng.gen_range(0..100) < self.read_percent {
            Operation::Get(key)
        } else {
            Operation::Put(key, self.next_value_size())
        }
    }
}

/// Encode a key the way the simulator stores it
pub fn key_bytes(key: u64) -> [u8; 8] {
    key.to_le_bytes()
}
