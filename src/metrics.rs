//! Map Metrics
//!
//! A point-in-time report of an [`OffheapMap`]'s counters and tunables,
//! exposed through the [`CacheMetrics`] trait so monitoring code can treat
//! every reporting component alike.
//!
//! Metrics are returned in a `BTreeMap` so keys always come out in the same
//! order, which keeps logs and CSV exports comparable between runs.

use crate::codec::Codec;
use crate::map::OffheapMap;
use crate::memory::Allocator;
use std::collections::BTreeMap;

/// Snapshot of an [`OffheapMap`]'s state.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MapMetrics {
    /// Number of buckets.
    pub capacity: u64,
    /// Number of stored entries, expired or not.
    pub entries: u64,
    /// Entries removed by expiry sweeps so far.
    pub expirations: u64,
    /// Bytes held by the allocator, bucket array included.
    pub allocated_bytes: u64,
    /// Entries above the occupancy target (negative when below it).
    pub entries_to_clean: i64,
    /// Configured time-to-live in milliseconds.
    pub time_to_live: u64,
    /// Configured cleanup threshold.
    pub cleanup_threshold: f64,
}

impl MapMetrics {
    /// Captures the current state of `map`.
    ///
    /// Counters are read one by one without locking, so they may be mutually
    /// inconsistent under concurrent writes.
    pub fn capture<C: Codec, A: Allocator>(map: &OffheapMap<C, A>) -> Self {
        Self {
            capacity: map.capacity() as u64,
            entries: map.len() as u64,
            expirations: map.expirations(),
            allocated_bytes: map.allocator().allocated_bytes() as u64,
            entries_to_clean: map.entries_to_clean(),
            time_to_live: map.settings().time_to_live(),
            cleanup_threshold: map.settings().cleanup_threshold(),
        }
    }

    /// Average chain length, `entries / capacity`.
    pub fn load_factor(&self) -> f64 {
        if self.capacity > 0 {
            self.entries as f64 / self.capacity as f64
        } else {
            0.0
        }
    }

    /// Converts the snapshot to a map keyed by metric name.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();

        metrics.insert("allocated_bytes".to_string(), self.allocated_bytes as f64);
        metrics.insert("capacity".to_string(), self.capacity as f64);
        metrics.insert("cleanup_threshold".to_string(), self.cleanup_threshold);
        metrics.insert("entries".to_string(), self.entries as f64);
        metrics.insert("entries_to_clean".to_string(), self.entries_to_clean as f64);
        metrics.insert("expirations".to_string(), self.expirations as f64);
        metrics.insert("load_factor".to_string(), self.load_factor());
        metrics.insert("time_to_live_ms".to_string(), self.time_to_live as f64);

        metrics
    }
}

/// Uniform metrics reporting.
pub trait CacheMetrics {
    /// Returns all metrics as name/value pairs in deterministic order.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Short name identifying the implementation in reports.
    fn algorithm_name(&self) -> &'static str;
}

impl<C: Codec, A: Allocator> CacheMetrics for OffheapMap<C, A> {
    fn metrics(&self) -> BTreeMap<String, f64> {
        MapMetrics::capture(self).to_btreemap()
    }

    fn algorithm_name(&self) -> &'static str {
        "OFFHEAP"
    }
}
