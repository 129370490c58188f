use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mapload::config::LoadConfig;
use mapload::map::{FaultInjection, InMemoryMap, KeyedMap};
use mapload::simple::run_load_test;
use mapload::{error, MapLoadError, Result};

#[derive(Parser, Debug)]
#[command(name = "mapload")]
#[command(about = "Concurrent write load generator for keyed map stores")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(long)]
    threads: Option<usize>,

    /// Size of the group keyspace
    #[arg(long)]
    keys: Option<u64>,

    /// Successful writes after which the run drains
    #[arg(long)]
    target: Option<u64>,

    /// Entries per block before the in-memory map splits it
    #[arg(long, default_value_t = mapload::map::memory::DEFAULT_BLOCK_SPLIT_SIZE)]
    block_split_size: usize,

    /// Probability (0.0 to 1.0) that a simulated write attempt fails
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Simulated latency per write attempt, in milliseconds
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

fn load_config(args: &Args) -> Result<LoadConfig> {
    let mut config = match &args.config {
        Some(path) => LoadConfig::load(path)?,
        None => LoadConfig::load_or_default()?,
    };

    if let Some(threads) = args.threads {
        config.thread_count = threads;
    }
    if let Some(keys) = args.keys {
        config.num_keys = keys;
    }
    if let Some(target) = args.target {
        config.target_volume = target;
    }

    config.validate()?;
    Ok(config)
}

fn fault_injection(args: &Args) -> Result<FaultInjection> {
    let faults = FaultInjection {
        failure_rate: args.failure_rate,
        latency: Duration::from_millis(args.latency_ms),
    };
    faults.validate()?;
    Ok(faults)
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            eprintln!("{}", error::user_friendly_message(&e));
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let faults = fault_injection(&args)?;
    let block_split_size = args.block_split_size;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.thread_count)
        .enable_all()
        .build()?;

    let summary = runtime.block_on(run_load_test(config, move || async move {
        let map = InMemoryMap::with_block_split_size(block_split_size).with_faults(faults, 0);
        Ok::<_, MapLoadError>(Arc::new(map) as Arc<dyn KeyedMap>)
    }))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary.describe());
    }

    Ok(())
}
