//! Simulation runner for cleanup strategies
//!
//! Every strategy gets a fresh map built from the same configuration and is
//! driven by the same per-worker operation streams, so differences in hit
//! rate and memory come from cleanup alone.
//!
//! Workers use the map cache-aside: a read miss is followed by a write of a
//! freshly sized value. Writes the allocator refuses are counted, not fatal.
//!
//! ## Memory Tracking
//!
//! Allocator usage is sampled by the workers every `MEMORY_SAMPLE_EVERY`
//! operations and the maximum is kept as the peak. It includes the bucket
//! array.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use offheap_map::{
    Allocator, BasicSweeper, BlobCodec, BoundedAllocator, CacheMetrics, CleanupThread, MapError,
    MapMetrics, OffheapMap, OffheapMapConfig, SamplingSweeper,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::models::{
    CleanupStrategy, LatencyPercentiles, LatencyStats, OpLatencyStats, SimulationConfig,
    SimulationResult, StrategyStats,
};
use crate::stats::SimulationStats;
use crate::workload::{key_bytes, Operation, Workload};

type SimulatedMap = OffheapMap<BlobCodec, BoundedAllocator>;

/// How often workers sample allocator usage
const MEMORY_SAMPLE_EVERY: usize = 1024;

/// Tracks latency for a single operation type
#[derive(Debug)]
struct OpLatencyTracker {
    /// Total time spent (nanoseconds)
    total_ns: u64,
    /// Number of operations
    count: u64,
    /// Minimum latency (nanoseconds)
    min_ns: u64,
    /// Maximum latency (nanoseconds)
    max_ns: u64,
    /// Sample reservoir for percentile calculation
    samples: Vec<u64>,
    /// Maximum samples to keep
    max_samples: usize,
    rng: SmallRng,
}

impl OpLatencyTracker {
    fn new(seed: u64) -> Self {
        Self {
            total_ns: 0,
            count: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            samples: Vec::with_capacity(5000),
            max_samples: 5000,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    #[inline]
    fn record(&mut self, latency_ns: u64) {
        self.total_ns += latency_ns;
        self.count += 1;
        self.min_ns = self.min_ns.min(latency_ns);
        self.max_ns = self.max_ns.max(latency_ns);

        // Reservoir sampling for percentiles
        if self.samples.len() < self.max_samples {
            self.samples.push(latency_ns);
        } else {
            let idx = self.rng.gen_range(0..self.count) as usize;
            if idx < self.max_samples {
                self.samples[idx] = latency_ns;
            }
        }
    }

    /// Fold another worker's tracker into this one
    fn merge(&mut self, other: OpLatencyTracker) {
        self.total_ns += other.total_ns;
        self.count += other.count;
        self.min_ns = self.min_ns.min(other.min_ns);
        self.max_ns = self.max_ns.max(other.max_ns);
        self.samples.extend(other.samples);
    }

    fn percentiles(&mut self) -> Option<LatencyPercentiles> {
        if self.samples.is_empty() {
            return None;
        }

        self.samples.sort_unstable();
        let len = self.samples.len();

        Some(LatencyPercentiles {
            p50_ns: self.samples[len * 50 / 100],
            p90_ns: self.samples[len * 90 / 100],
            p99_ns: self.samples[len * 99 / 100],
            p999_ns: self.samples[len.saturating_sub(1).min(len * 999 / 1000)],
        })
    }

    fn finalize(&mut self) -> OpLatencyStats {
        OpLatencyStats {
            total_ns: self.total_ns,
            count: self.count,
            min_ns: if self.min_ns == u64::MAX { 0 } else { self.min_ns },
            max_ns: self.max_ns,
            percentiles: self.percentiles(),
        }
    }
}

/// What one worker observed
#[derive(Debug)]
struct WorkerReport {
    hits: usize,
    misses: usize,
    puts: usize,
    failed_puts: usize,
    get_latency: OpLatencyTracker,
    put_latency: OpLatencyTracker,
}

impl WorkerReport {
    fn new(worker: usize) -> Self {
        let seed = worker as u64;
        Self {
            hits: 0,
            misses: 0,
            puts: 0,
            failed_puts: 0,
            get_latency: OpLatencyTracker::new(seed),
            put_latency: OpLatencyTracker::new(!seed),
        }
    }

    fn merge(&mut self, other: WorkerReport) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.puts += other.puts;
        self.failed_puts += other.failed_puts;
        self.get_latency.merge(other.get_latency);
        self.put_latency.merge(other.put_latency);
    }

    fn latency(&mut self) -> LatencyStats {
        let get_stats = self.get_latency.finalize();
        let put_stats = self.put_latency.finalize();
        LatencyStats {
            total_ns: get_stats.total_ns + put_stats.total_ns,
            count: get_stats.count + put_stats.count,
            get_stats,
            put_stats,
        }
    }
}

/// Runs one simulation per configured strategy
pub struct SimulationRunner {
    config: SimulationConfig,
}

impl SimulationRunner {
    /// Create a runner for the given configuration
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Run every strategy in turn
    pub fn run(&self) -> Result<SimulationResult, String> {
        let start = Instant::now();
        let mut stats = SimulationStats::new(&self.config.strategies);

        for &strategy in &self.config.strategies {
            println!("Running {} cleanup...", strategy);
            let strategy_stats = self
                .run_strategy(strategy)
                .map_err(|e| format!("{strategy} run failed: {e}"))?;
            stats.record(strategy, strategy_stats);
        }

        Ok(SimulationResult {
            stats: stats.into_stats(),
            total_ops: self.config.threads * self.config.ops_per_thread,
            duration: start.elapsed(),
        })
    }

    fn map_config(&self) -> OffheapMapConfig {
        OffheapMapConfig::new(self.config.capacity)
            .with_time_to_live(self.config.time_to_live)
            .with_min_time_to_live(self.config.min_time_to_live)
            .with_cleanup_interval(self.config.cleanup_interval)
            .with_cleanup_threshold(self.config.cleanup_threshold)
            .with_max_samples(self.config.max_samples)
    }

    fn run_strategy(&self, strategy: CleanupStrategy) -> Result<StrategyStats, Box<dyn std::error::Error>> {
        let allocator = BoundedAllocator::new(self.config.memory_limit.unwrap_or(usize::MAX));
        let map: Arc<SimulatedMap> =
            Arc::new(OffheapMap::with_allocator(self.map_config(), BlobCodec::new(), allocator)?);

        let cleanup = match strategy {
            CleanupStrategy::None => None,
            CleanupStrategy::Basic => Some(CleanupThread::spawn(
                "basic-cleanup",
                Arc::clone(&map),
                BasicSweeper::new(),
            )?),
            CleanupStrategy::Sampling => Some(CleanupThread::spawn(
                "sampling-cleanup",
                Arc::clone(&map),
                SamplingSweeper::with_seed(self.config.workload.seed),
            )?),
        };

        let started = Instant::now();
        let peak = Arc::new(AtomicUsize::new(map.allocator().allocated_bytes()));
        let mut handles = Vec::with_capacity(self.config.threads);
        for worker in 0..self.config.threads {
            let map = Arc::clone(&map);
            let peak = Arc::clone(&peak);
            let workload = Workload::new(&self.config.workload, worker);
            let ops = self.config.ops_per_thread;
            handles.push(thread::spawn(move || run_worker(&map, workload, ops, worker, &peak)));
        }

        let mut report = WorkerReport::new(0);
        for handle in handles {
            let worker_report = handle.join().map_err(|_| "worker thread panicked")?;
            report.merge(worker_report?);
        }
        let elapsed = started.elapsed();

        if let Some(cleanup) = cleanup {
            cleanup.stop();
        }

        let metrics = MapMetrics::capture(&*map);
        println!(
            "  {}: {} entries, load factor {:.3}, {} to clean",
            map.algorithm_name(),
            metrics.entries,
            metrics.load_factor(),
            metrics.entries_to_clean.max(0)
        );

        let allocated = map.allocator().allocated_bytes();
        Ok(StrategyStats {
            hits: report.hits,
            misses: report.misses,
            puts: report.puts,
            failed_puts: report.failed_puts,
            simulation_time_ms: elapsed.as_millis() as u64,
            final_entries: map.len(),
            expirations: metrics.expirations,
            peak_allocated_bytes: peak.load(Ordering::Relaxed).max(allocated),
            final_allocated_bytes: allocated,
            latency: report.latency(),
        })
    }
}

/// Drive one worker's operation stream against the map
fn run_worker(
    map: &SimulatedMap,
    mut workload: Workload,
    ops: usize,
    worker: usize,
    peak: &AtomicUsize,
) -> Result<WorkerReport, MapError> {
    let mut report = WorkerReport::new(worker);
    let value = vec![worker as u8; workload.max_value_size()];

    for i in 0..ops {
        let (key, size) = match workload.next_operation() {
            Operation::Get(key) => {
                let start = Instant::now();
                let found = map.get(&key_bytes(key)).is_some();
                report.get_latency.record(start.elapsed().as_nanos() as u64);
                if found {
                    report.hits += 1;
                    continue;
                }
                report.misses += 1;
                (key, workload.next_value_size())
            }
            Operation::Put(key, size) => (key, size),
        };

        let start = Instant::now();
        let result = map.put(&key_bytes(key), &value[..size]);
        report.put_latency.record(start.elapsed().as_nanos() as u64);
        match result {
            Ok(()) => report.puts += 1,
            Err(MapError::OutOfMemory { .. }) => report.failed_puts += 1,
            Err(e) => return Err(e),
        }

        if i % MEMORY_SAMPLE_EVERY == 0 {
            peak.fetch_max(map.allocator().allocated_bytes(), Ordering::Relaxed);
        }
    }

    Ok(report)
}
