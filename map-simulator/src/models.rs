// Data models for map simulation

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Cleanup strategies that can be simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CleanupStrategy {
    /// No cleanup thread; expired entries stay until overwritten
    None,
    /// Periodic removal of entries older than the TTL
    Basic,
    /// Occupancy-driven removal of the oldest entries
    Sampling,
}

impl CleanupStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupStrategy::None => "None",
            CleanupStrategy::Basic => "Basic",
            CleanupStrategy::Sampling => "Sampling",
        }
    }

    /// Parse a strategy name, case-insensitively
    pub fn parse(name: &str) -> Option<CleanupStrategy> {
        match name.to_lowercase().as_str() {
            "none" | "off" => Some(CleanupStrategy::None),
            "basic" | "ttl" => Some(CleanupStrategy::Basic),
            "sampling" | "sample" => Some(CleanupStrategy::Sampling),
            _ => None,
        }
    }

    /// Get all available strategies
    pub fn all() -> Vec<CleanupStrategy> {
        vec![
            CleanupStrategy::None,
            CleanupStrategy::Basic,
            CleanupStrategy::Sampling,
        ]
    }
}

impl fmt::Display for CleanupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shape of the synthetic traffic
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Number of distinct keys
    pub keys: u64,
    /// Percentage of operations that are reads
    pub read_percent: u8,
    /// Percentage of traffic that goes to popular keys
    pub popular_traffic_percent: u8,
    /// Percentage of keys that are popular
    pub popular_keys_percent: u8,
    /// Minimum value size in bytes
    pub min_value_size: usize,
    /// Maximum value size in bytes
    pub max_value_size: usize,
    /// Base seed; each worker derives its own stream from it
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            keys: 100_000,
            read_percent: 80,
            popular_traffic_percent: 80,
            popular_keys_percent: 20,
            min_value_size: 16,
            max_value_size: 1024,
            seed: 0,
        }
    }
}

/// Configuration for a simulation run
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Requested bucket count of the map
    pub capacity: usize,
    /// Number of worker threads
    pub threads: usize,
    /// Operations issued by each worker
    pub ops_per_thread: usize,
    /// Traffic shape
    pub workload: WorkloadConfig,
    /// Strategies to simulate, one fresh map each
    pub strategies: Vec<CleanupStrategy>,
    /// Entry time-to-live in milliseconds
    pub time_to_live: u64,
    /// Youngest age the sampling sweeper may remove, in milliseconds
    pub min_time_to_live: u64,
    /// Milliseconds between sweeps
    pub cleanup_interval: u64,
    /// Fraction of capacity kept free by the sampling sweeper
    pub cleanup_threshold: f64,
    /// Timestamps sampled per sampling sweep
    pub max_samples: usize,
    /// Byte budget for entries and bucket array (None = unbounded)
    pub memory_limit: Option<usize>,
}

/// Results of a simulation run
#[derive(Debug)]
pub struct SimulationResult {
    /// Statistics for each strategy
    pub stats: BTreeMap<CleanupStrategy, StrategyStats>,
    /// Operations issued per strategy
    pub total_ops: usize,
    /// Wall-clock duration of the whole run
    pub duration: Duration,
}

/// Statistics for a single strategy
#[derive(Debug, Default, Clone)]
pub struct StrategyStats {
    /// Reads that found a live value
    pub hits: usize,
    /// Reads that found nothing (absent or expired)
    pub misses: usize,
    /// Successful writes
    pub puts: usize,
    /// Writes refused by the allocator
    pub failed_puts: usize,
    /// Wall-clock time of the strategy's run in milliseconds
    pub simulation_time_ms: u64,
    /// Entries left in the map at the end
    pub final_entries: usize,
    /// Entries removed by sweeps
    pub expirations: u64,
    /// Highest observed allocator usage in bytes
    pub peak_allocated_bytes: usize,
    /// Allocator usage at the end in bytes
    pub final_allocated_bytes: usize,
    /// Latency statistics for map operations
    pub latency: LatencyStats,
}

impl StrategyStats {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Calculate the share of writes that failed as percentage
    pub fn failure_rate(&self) -> f64 {
        let total = self.puts + self.failed_puts;
        if total > 0 {
            (self.failed_puts as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Latency statistics for a single operation type
#[derive(Debug, Clone, Default)]
pub struct OpLatencyStats {
    /// Total time spent (nanoseconds)
    pub total_ns: u64,
    /// Number of operations
    pub count: u64,
    /// Minimum latency (nanoseconds)
    pub min_ns: u64,
    /// Maximum latency (nanoseconds)
    pub max_ns: u64,
    /// Latency percentiles
    pub percentiles: Option<LatencyPercentiles>,
}

impl OpLatencyStats {
    /// Calculate average latency in nanoseconds
    pub fn avg_ns(&self) -> f64 {
        if self.count > 0 {
            self.total_ns as f64 / self.count as f64
        } else {
            0.0
        }
    }

    /// Returns the given percentile, or zero when nothing was sampled
    pub fn percentile(&self, pick: impl Fn(&LatencyPercentiles) -> u64) -> u64 {
        self.percentiles.as_ref().map(pick).unwrap_or(0)
    }
}

/// Latency statistics for all map operations
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    /// Total time spent in all operations (nanoseconds)
    pub total_ns: u64,
    /// Total number of operations
    pub count: u64,
    /// Get operation stats
    pub get_stats: OpLatencyStats,
    /// Put operation stats
    pub put_stats: OpLatencyStats,
}

impl LatencyStats {
    /// Calculate average latency in nanoseconds (across all operations)
    pub fn avg_ns(&self) -> f64 {
        if self.count > 0 {
            self.total_ns as f64 / self.count as f64
        } else {
            0.0
        }
    }
}

/// Latency percentiles
#[derive(Debug, Clone, Default)]
pub struct LatencyPercentiles {
    pub p50_ns: u64,
    pub p90_ns: u64,
    pub p99_ns: u64,
    pub p999_ns: u64,
}

/// CSV export row for simulation results
#[derive(Debug, Serialize)]
pub struct CsvResultRow {
    pub strategy: String,
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f64,
    pub puts: usize,
    pub failed_puts: usize,
    pub simulation_time_ms: u64,
    pub final_entries: usize,
    pub expirations: u64,
    pub peak_allocated_bytes: usize,
    pub final_allocated_bytes: usize,
    /// Total operations (get + put)
    pub total_ops: u64,
    /// Combined average latency in nanoseconds
    pub avg_latency_ns: f64,
    // Get operation stats
    pub get_ops: u64,
    pub get_avg_ns: f64,
    pub get_min_ns: u64,
    pub get_max_ns: u64,
    pub get_p50_ns: u64,
    pub get_p99_ns: u64,
    // Put operation stats
    pub put_ops: u64,
    pub put_avg_ns: f64,
    pub put_min_ns: u64,
    pub put_max_ns: u64,
    pub put_p50_ns: u64,
    pub put_p99_ns: u64,
}
