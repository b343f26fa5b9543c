// Statistics collection and reporting for map simulation

use crate::models::{CleanupStrategy, CsvResultRow, SimulationResult, StrategyStats};
use std::collections::BTreeMap;
use std::path::Path;

/// Collects and reports statistics from simulation runs
pub struct SimulationStats {
    /// Stats for each strategy
    stats: BTreeMap<CleanupStrategy, StrategyStats>,
}

impl SimulationStats {
    /// Create a new statistics collector for the given strategies
    pub fn new(strategies: &[CleanupStrategy]) -> Self {
        let stats = strategies
            .iter()
            .map(|&strategy| (strategy, StrategyStats::new()))
            .collect();
        Self { stats }
    }

    /// Store the finished statistics of one strategy
    pub fn record(&mut self, strategy: CleanupStrategy, stats: StrategyStats) {
        self.stats.insert(strategy, stats);
    }

    /// Consume the collector, returning the per-strategy stats
    pub fn into_stats(self) -> BTreeMap<CleanupStrategy, StrategyStats> {
        self.stats
    }

    /// Create SimulationStats from a SimulationResult (for reporting after run)
    pub fn from_result(result: &SimulationResult) -> Self {
        Self {
            stats: result.stats.clone(),
        }
    }

    /// Print a summary report of the simulation results
    pub fn print_summary(&self) {
        println!("\nMap Simulation Summary");
        println!("======================");
        println!(
            "{:<9} {:>8} {:>10} {:>10} {:>10} {:>12} {:>12} {:>9} {:>9} {:>9}",
            "Strategy",
            "HitRate",
            "Failed%",
            "Entries",
            "Expired",
            "PeakMB",
            "FinalMB",
            "GetAvg",
            "PutAvg",
            "p99"
        );
        println!("{}", "-".repeat(110));

        for (strategy, stats) in &self.stats {
            println!(
                "{:<9} {:>7.2}% {:>9.2}% {:>10} {:>10} {:>12.2} {:>12.2} {:>7.0}ns {:>7.0}ns {:>7}ns",
                strategy.as_str(),
                stats.hit_rate(),
                stats.failure_rate(),
                stats.final_entries,
                stats.expirations,
                stats.peak_allocated_bytes as f64 / 1_048_576.0,
                stats.final_allocated_bytes as f64 / 1_048_576.0,
                stats.latency.get_stats.avg_ns(),
                stats.latency.put_stats.avg_ns(),
                stats.latency.get_stats.percentile(|p| p.p99_ns)
            );
        }
    }

    /// Export results to a CSV file
    pub fn export_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;

        for (strategy, stats) in &self.stats {
            let get = &stats.latency.get_stats;
            let put = &stats.latency.put_stats;
            writer.serialize(CsvResultRow {
                strategy: strategy.as_str().to_string(),
                hits: stats.hits,
                misses: stats.misses,
                hit_rate: stats.hit_rate(),
                puts: stats.puts,
                failed_puts: stats.failed_puts,
                simulation_time_ms: stats.simulation_time_ms,
                final_entries: stats.final_entries,
                expirations: stats.expirations,
                peak_allocated_bytes: stats.peak_allocated_bytes,
                final_allocated_bytes: stats.final_allocated_bytes,
                total_ops: stats.latency.count,
                avg_latency_ns: stats.latency.avg_ns(),
                get_ops: get.count,
                get_avg_ns: get.avg_ns(),
                get_min_ns: get.min_ns,
                get_max_ns: get.max_ns,
                get_p50_ns: get.percentile(|p| p.p50_ns),
                get_p99_ns: get.percentile(|p| p.p99_ns),
                put_ops: put.count,
                put_avg_ns: put.avg_ns(),
                put_min_ns: put.min_ns,
                put_max_ns: put.max_ns,
                put_p50_ns: put.percentile(|p| p.p50_ns),
                put_p99_ns: put.percentile(|p| p.p99_ns),
            })?;
        }

        writer.flush()?;
        Ok(())
    }
}
