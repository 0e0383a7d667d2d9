//! Switchboard queue-processor daemon.
//!
//! This is the main entry point for the fan-out worker service. It leases
//! batches of delivery jobs from the durable queue and drives each through
//! the platform adapters.
//!
//! # Usage
//!
//! ```bash
//! # Run with default settings (one worker, batches of 100)
//! queue-processor
//!
//! # Drain one batch and exit (cron-style operation)
//! queue-processor --once
//!
//! # Four parallel workers with a runtime budget
//! queue-processor --workers 4 --max-runtime 3600
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) and SIGTERM:
//! 1. Stops leasing new batches
//! 2. Finishes (or releases) in-flight jobs
//! 3. Exits cleanly with a summary

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics::gauge;
use switchboard_core::metrics::{init_metrics, start_metrics_server};
use switchboard_pipeline::{
    adapters::AdapterFactory, processor::ProcessorConfig, Processor, Queue, ReadyIndex, Router,
    Store, ValidatorConfig, Worker, WorkerConfig,
};
use tracing_subscriber::EnvFilter;

/// Switchboard fan-out worker daemon.
#[derive(Parser, Debug)]
#[command(name = "queue-processor")]
#[command(about = "Lease and deliver queued platform jobs")]
#[command(version)]
struct Args {
    /// SQLite database path
    #[arg(long, env = "SWITCHBOARD_DB_PATH", default_value = "./data/switchboard.db")]
    db_path: std::path::PathBuf,

    /// Process one batch per worker, then exit
    #[arg(long)]
    once: bool,

    /// Number of parallel workers
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Jobs leased per batch
    #[arg(long, env = "QUEUE_BATCH_SIZE", default_value = "100")]
    batch_size: usize,

    /// Idle sleep between empty polls, in seconds
    #[arg(long, default_value = "5")]
    sleep: u64,

    /// Wall-clock budget in seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_runtime: u64,

    /// Lease duration per batch, in seconds
    #[arg(long, default_value = "300")]
    lease: i64,

    /// Disable the in-memory ready index
    #[arg(long)]
    no_index: bool,

    /// Email-validation cache TTL, in days
    #[arg(long, env = "VALIDATION_CACHE_DAYS", default_value = "30")]
    validation_cache_days: i64,

    /// Daily budget of outbound validation calls
    #[arg(long, env = "ZEROBOUNCE_DAILY_LIMIT", default_value = "10000")]
    validation_daily_limit: u32,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9090")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap())
                .add_directive("switchboard_pipeline=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Switchboard queue processor starting...");

    if args.metrics_port > 0 {
        let handle = init_metrics();
        start_metrics_server(args.metrics_port, handle).await?;
        gauge!("worker_running").set(0.0);
        tracing::info!("Metrics server listening on port {}", args.metrics_port);
    }

    // Set up graceful shutdown
    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        stop_handler.store(true, std::sync::atomic::Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    // Wire the pipeline
    let store = Arc::new(
        Store::open(&args.db_path)
            .with_context(|| format!("Failed to open store at {:?}", args.db_path))?,
    );
    let router = Arc::new(Router::new(Arc::clone(&store)).context("Failed to build router")?);
    let index = (!args.no_index).then(|| Arc::new(ReadyIndex::new()));
    let queue = Arc::new(Queue::new(Arc::clone(&store), index));
    let processor = Arc::new(Processor::new(
        Arc::clone(&store),
        Arc::clone(&router),
        Arc::clone(&queue),
        Arc::new(AdapterFactory::with_defaults()),
        ProcessorConfig {
            validator: ValidatorConfig {
                cache_ttl_days: args.validation_cache_days,
                ..ValidatorConfig::default()
            },
            validation_daily_limit: args.validation_daily_limit,
        },
    ));

    tracing::info!("Configuration:");
    tracing::info!("  Database:   {}", args.db_path.display());
    tracing::info!("  Workers:    {}", args.workers);
    tracing::info!("  Batch size: {}", args.batch_size);
    tracing::info!("  Lease:      {}s", args.lease);
    tracing::info!("  Index:      {}", if args.no_index { "disabled" } else { "enabled" });
    tracing::info!("  Platforms:  {} active", router.active_platform_count());

    let worker_config = WorkerConfig {
        batch_size: args.batch_size,
        lease_secs: args.lease,
        sleep_secs: args.sleep,
        once: args.once,
        max_runtime_secs: (args.max_runtime > 0).then_some(args.max_runtime),
        ..WorkerConfig::default()
    };

    // Spawn workers, each with its own identity
    let mut handles = Vec::with_capacity(args.workers.max(1));
    for _ in 0..args.workers.max(1) {
        let worker = Worker::new(
            Arc::clone(&queue),
            Arc::clone(&processor),
            worker_config.clone(),
        );
        let stop = Arc::clone(&stop);
        handles.push(tokio::spawn(async move { worker.run(stop).await }));
    }

    let mut leased = 0usize;
    let mut completed = 0usize;
    let mut retried = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    let mut released = 0usize;
    for handle in handles {
        match handle.await {
            Ok(stats) => {
                leased += stats.leased;
                completed += stats.completed;
                retried += stats.retried;
                failed += stats.failed;
                skipped += stats.skipped;
                released += stats.released;
            }
            Err(e) => tracing::error!("worker task panicked: {e}"),
        }
    }

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Jobs leased:     {}", leased);
    tracing::info!("Jobs completed:  {}", completed);
    tracing::info!("Jobs retried:    {}", retried);
    tracing::info!("Jobs failed:     {}", failed);
    tracing::info!("Jobs skipped:    {}", skipped);
    tracing::info!("Jobs released:   {}", released);

    Ok(())
}
