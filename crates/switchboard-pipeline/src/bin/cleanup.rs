//! Scheduled maintenance for the Switchboard store.
//!
//! Intended to run from cron. Tasks:
//!
//! - `queue`     delete terminal jobs older than the age threshold
//! - `stuck`     recover leases expired past the grace period
//! - `logs`      prune old processing-log rows
//! - `analytics` roll daily counters into `analytics_daily`
//! - `optimize`  VACUUM + ANALYZE
//! - `all`       everything above, in that order
//!
//! `--dry-run` reports what would change without touching anything (the
//! reaper and optimize are skipped entirely in that mode).

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use switchboard_pipeline::Store;
use tracing_subscriber::EnvFilter;

/// Switchboard store maintenance.
#[derive(Parser, Debug)]
#[command(name = "cleanup")]
#[command(about = "Prune and maintain the Switchboard store")]
#[command(version)]
struct Args {
    /// SQLite database path
    #[arg(long, env = "SWITCHBOARD_DB_PATH", default_value = "./data/switchboard.db")]
    db_path: std::path::PathBuf,

    /// Task to run: queue|stuck|logs|analytics|optimize|all
    #[arg(long, default_value = "all")]
    task: String,

    /// Report without modifying anything
    #[arg(long)]
    dry_run: bool,

    /// Age threshold in days for queue and log pruning
    #[arg(long, default_value = "30")]
    days: i64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let store = Arc::new(
        Store::open(&args.db_path)
            .with_context(|| format!("Failed to open store at {:?}", args.db_path))?,
    );

    let older_than_secs = args.days * 86_400;
    let run_all = args.task == "all";
    let mut ran_any = false;

    if run_all || args.task == "queue" {
        ran_any = true;
        let affected = store.cleanup_queue(older_than_secs, args.dry_run)?;
        tracing::info!(
            affected,
            dry_run = args.dry_run,
            "queue: terminal jobs older than {} days",
            args.days
        );
    }

    if run_all || args.task == "stuck" {
        ran_any = true;
        if args.dry_run {
            tracing::info!("stuck: skipped (no dry-run mode for the reaper)");
        } else {
            let reaped = store.reap_stuck_jobs(60)?;
            tracing::info!(reaped, "stuck: expired leases recovered");
        }
    }

    if run_all || args.task == "logs" {
        ran_any = true;
        let affected = store.prune_processing_log(older_than_secs, args.dry_run)?;
        tracing::info!(
            affected,
            dry_run = args.dry_run,
            "logs: rows older than {} days",
            args.days
        );
    }

    if run_all || args.task == "analytics" {
        ran_any = true;
        if args.dry_run {
            tracing::info!("analytics: skipped (rollup is an upsert, nothing to preview)");
        } else {
            let now = chrono::Utc::now().timestamp();
            let today_start = now - now.rem_euclid(86_400);
            // Re-roll yesterday (late completions) and today so far.
            store.rollup_analytics_day(today_start - 86_400)?;
            store.rollup_analytics_day(today_start)?;
            tracing::info!("analytics: rolled up yesterday and today");
        }
    }

    if run_all || args.task == "optimize" {
        ran_any = true;
        if args.dry_run {
            tracing::info!("optimize: skipped (dry run)");
        } else {
            store.optimize()?;
            tracing::info!("optimize: VACUUM + ANALYZE done");
        }
    }

    if !ran_any {
        bail!(
            "unknown task '{}'; expected queue|stuck|logs|analytics|optimize|all",
            args.task
        );
    }

    Ok(())
}
