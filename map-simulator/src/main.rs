use clap::Parser;
use map_simulator::models::{CleanupStrategy, SimulationConfig, WorkloadConfig};
use map_simulator::runner::SimulationRunner;
use map_simulator::stats::SimulationStats;
use std::path::PathBuf;

/// Off-heap map cleanup simulator CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Map capacity (number of buckets, rounded up to a multiple of 65536)
    #[arg(short, long, default_value = "65536")]
    capacity: usize,

    /// Number of distinct keys
    #[arg(short, long, default_value = "100000")]
    keys: u64,

    /// Number of worker threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Operations issued by each worker
    #[arg(long, default_value = "250000")]
    ops: usize,

    /// Percentage of operations that are reads (default: 80%)
    #[arg(long, default_value = "80")]
    read_percent: u8,

    /// Percentage of traffic from popular keys (default: 80%)
    #[arg(long, default_value = "80")]
    popular_traffic: u8,

    /// Percentage of keys that are popular (default: 20%)
    #[arg(long, default_value = "20")]
    popular_keys: u8,

    /// Minimum value size in bytes
    #[arg(long, default_value = "16")]
    min_value_size: usize,

    /// Maximum value size in bytes
    #[arg(long, default_value = "1024")]
    max_value_size: usize,

    /// Entry time-to-live in milliseconds
    #[arg(long, default_value = "1000")]
    ttl: u64,

    /// Youngest age the sampling sweeper may remove, in milliseconds
    #[arg(long, default_value = "0")]
    min_ttl: u64,

    /// Cleanup strategies to simulate (none, basic, sampling)
    /// If not provided, all strategies will be used
    #[arg(short, long, value_name = "STRATEGIES", num_args = 1.., value_delimiter = ',')]
    strategy: Option<Vec<String>>,

    /// Milliseconds between sweeps
    #[arg(long, default_value = "100")]
    cleanup_interval: u64,

    /// Fraction of capacity the sampling sweeper keeps free
    #[arg(long, default_value = "0.1")]
    cleanup_threshold: f64,

    /// Timestamps sampled per sampling sweep
    #[arg(long, default_value = "1000")]
    max_samples: usize,

    /// Byte budget for the map, bucket array included
    /// Example: 104857600 for 100MB
    #[arg(long)]
    memory_limit: Option<usize>,

    /// Seed for the workload streams
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Export results to CSV file
    #[arg(long, value_name = "PATH")]
    output_csv: Option<PathBuf>,
}

/// Resolve strategy names, falling back to all strategies
fn parse_strategies(names: Option<&[String]>) -> Vec<CleanupStrategy> {
    let mut selected = Vec::new();
    for name in names.unwrap_or_default() {
        match CleanupStrategy::parse(name) {
            Some(strategy) if !selected.contains(&strategy) => selected.push(strategy),
            Some(_) => {}
            None => println!("Warning: Unknown strategy '{name}', skipping"),
        }
    }
    if selected.is_empty() {
        CleanupStrategy::all()
    } else {
        selected
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if !(0.0..=1.0).contains(&args.cleanup_threshold) {
        return Err(format!(
            "cleanup threshold must be within 0.0..=1.0, got {}",
            args.cleanup_threshold
        )
        .into());
    }

    let config = SimulationConfig {
        capacity: args.capacity,
        threads: args.threads.max(1),
        ops_per_thread: args.ops,
        workload: WorkloadConfig {
            keys: args.keys,
            read_percent: args.read_percent,
            popular_traffic_percent: args.popular_traffic,
            popular_keys_percent: args.popular_keys,
            min_value_size: args.min_value_size,
            max_value_size: args.max_value_size,
            seed: args.seed,
        },
        strategies: parse_strategies(args.strategy.as_deref()),
        time_to_live: args.ttl,
        min_time_to_live: args.min_ttl,
        cleanup_interval: args.cleanup_interval,
        cleanup_threshold: args.cleanup_threshold,
        max_samples: args.max_samples,
        memory_limit: args.memory_limit,
    };

    println!("Map Simulation");
    println!("==============");
    println!("Capacity: {} buckets", config.capacity);
    println!(
        "Workload: {} keys, {} threads x {} ops, {}% reads",
        config.workload.keys, config.threads, config.ops_per_thread, config.workload.read_percent
    );
    println!(
        "Strategies: {:?}",
        config.strategies.iter().map(|s| s.as_str()).collect::<Vec<_>>()
    );
    if let Some(limit) = config.memory_limit {
        println!("Memory limit: {} bytes ({:.2} MB)", limit, limit as f64 / 1_048_576.0);
    }
    println!();

    let result = SimulationRunner::new(config).run()?;
    println!("\nSimulation completed in {:.2?}", result.duration);
    println!("Operations per strategy: {}", result.total_ops);

    let stats = SimulationStats::from_result(&result);
    stats.print_summary();

    if let Some(csv_path) = args.output_csv {
        match stats.export_csv(&csv_path) {
            Ok(()) => println!("\nResults exported to: {}", csv_path.display()),
            Err(e) => eprintln!("Failed to export CSV: {e}"),
        }
    }

    Ok(())
}
