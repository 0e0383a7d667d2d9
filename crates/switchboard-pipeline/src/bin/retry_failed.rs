//! Operator re-drive of terminally failed jobs.
//!
//! Failed jobs with retry budget left are moved back to pending with the
//! normal backoff applied. `failed` is the only terminal state this touches.
//!
//! ```bash
//! # Preview what the last day would retry
//! retry-failed --dry-run
//!
//! # Retry up to 50 CRM failures from the last 6 hours
//! retry-failed --hours 6 --platform leadcrm --limit 50
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use switchboard_pipeline::Store;
use tracing_subscriber::EnvFilter;

/// Re-drive failed delivery jobs.
#[derive(Parser, Debug)]
#[command(name = "retry-failed")]
#[command(about = "Reschedule terminally failed jobs with retry budget left")]
#[command(version)]
struct Args {
    /// SQLite database path
    #[arg(long, env = "SWITCHBOARD_DB_PATH", default_value = "./data/switchboard.db")]
    db_path: std::path::PathBuf,

    /// Look-back window in hours
    #[arg(long, default_value = "24")]
    hours: i64,

    /// Restrict to one platform code
    #[arg(long)]
    platform: Option<String>,

    /// Maximum number of jobs to reschedule
    #[arg(long)]
    limit: Option<usize>,

    /// Report without modifying anything
    #[arg(long)]
    dry_run: bool,
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

    let platform_id = match &args.platform {
        Some(code) => match store.get_platform_by_code(code)? {
            Some(platform) => Some(platform.id),
            None => bail!("unknown platform code '{code}'"),
        },
        None => None,
    };

    let rescheduled =
        store.retry_failed_jobs(args.hours * 3600, platform_id, args.limit, args.dry_run)?;

    if args.dry_run {
        tracing::info!(
            count = rescheduled.len(),
            "dry run: jobs that would be rescheduled"
        );
        for id in &rescheduled {
            tracing::info!(job_id = id, "would reschedule");
        }
    } else {
        tracing::info!(count = rescheduled.len(), "jobs rescheduled with backoff");
    }

    Ok(())
}
