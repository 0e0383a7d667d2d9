//! The long-running fan-out worker loop.
//!
//! A worker repeatedly leases a batch of due jobs and drives each through
//! the processor. Parallelism comes from running several workers (tokio
//! tasks), each with its own worker id; within one worker, jobs execute
//! sequentially.
//!
//! # Shutdown
//!
//! The loop watches a shared stop flag (set by the signal handler). On
//! stop it finishes nothing new: unprocessed jobs from the current batch
//! are released back to pending so another worker can pick them up
//! immediately instead of waiting out the lease.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::gauge;
use rand::Rng;
use switchboard_core::DEFAULT_LEASE_SECONDS;

use crate::processor::{JobOutcome, Processor};
use crate::queue::Queue;

/// Worker loop knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs leased per batch.
    pub batch_size: usize,
    /// Lease duration granted per batch.
    pub lease_secs: i64,
    /// Idle sleep when the queue is empty.
    pub sleep_secs: u64,
    /// Process at most one batch, then exit.
    pub once: bool,
    /// Wall-clock budget for the whole loop.
    pub max_runtime_secs: Option<u64>,
    /// Grace period past lease expiry before the reaper reclaims a job.
    pub reap_grace_secs: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            batch_size: 100,
            lease_secs: DEFAULT_LEASE_SECONDS,
            sleep_secs: 5,
            once: false,
            max_runtime_secs: None,
            reap_grace_secs: 60,
        }
    }
}

/// Counters reported when a worker loop exits.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    pub leased: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped: usize,
    pub released: usize,
}

/// One worker: leases batches and executes jobs until stopped.
pub struct Worker {
    queue: Arc<Queue>,
    processor: Arc<Processor>,
    worker_id: String,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(queue: Arc<Queue>, processor: Arc<Processor>, config: WorkerConfig) -> Self {
        Worker {
            queue,
            processor,
            worker_id: derive_worker_id(),
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until stopped, the runtime budget runs out, or (`once`) the
    /// first batch is done.
    pub async fn run(&self, stop: Arc<AtomicBool>) -> WorkerStats {
        let started = Instant::now();
        let mut stats = WorkerStats::default();
        gauge!("worker_running").set(1.0);
        tracing::info!(worker_id = %self.worker_id, "worker started");

        loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            if let Some(budget) = self.config.max_runtime_secs {
                if started.elapsed() >= Duration::from_secs(budget) {
                    tracing::info!(worker_id = %self.worker_id, "runtime budget exhausted");
                    break;
                }
            }

            // Stuck-lease recovery at batch boundaries.
            if let Err(e) = self
                .queue
                .reap_stuck(self.config.lease_secs + self.config.reap_grace_secs)
            {
                tracing::warn!(error = %e, "reaper pass failed");
            }

            let jobs = match self.queue.lease_batch(
                &self.worker_id,
                self.config.batch_size,
                self.config.lease_secs,
            ) {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::error!(error = %e, "lease batch failed");
                    // Brief pause so a sick store does not spin us hot.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                if self.config.once {
                    break;
                }
                self.idle_sleep(&stop).await;
                continue;
            }

            stats.leased += jobs.len();
            let mut jobs = jobs.into_iter();
            while let Some(job) = jobs.next() {
                if stop.load(Ordering::SeqCst) {
                    // Release this job and the rest of the batch unprocessed.
                    for unprocessed in std::iter::once(job).chain(&mut jobs) {
                        match self.queue.release(&unprocessed, &self.worker_id) {
                            Ok(true) => stats.released += 1,
                            Ok(false) => {}
                            Err(e) => {
                                tracing::warn!(job_id = unprocessed.id, error = %e, "release failed")
                            }
                        }
                    }
                    break;
                }
                match self.processor.execute_job(&job, &self.worker_id).await {
                    Ok(JobOutcome::Completed) => stats.completed += 1,
                    Ok(JobOutcome::Retried) => stats.retried += 1,
                    Ok(JobOutcome::Failed) => stats.failed += 1,
                    Ok(JobOutcome::Skipped) => stats.skipped += 1,
                    Err(e) => {
                        // The job stays leased; the reaper will recover it.
                        tracing::error!(job_id = job.id, error = %e, "job execution errored");
                    }
                }
            }

            if let Err(e) = self.queue.update_depth_gauges() {
                tracing::debug!(error = %e, "depth gauge refresh failed");
            }
            if self.config.once {
                break;
            }
            // Yield briefly between batches.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        gauge!("worker_running").set(0.0);
        tracing::info!(
            worker_id = %self.worker_id,
            leased = stats.leased,
            completed = stats.completed,
            retried = stats.retried,
            failed = stats.failed,
            skipped = stats.skipped,
            released = stats.released,
            "worker stopped"
        );
        stats
    }

    /// Sleep out the idle interval in small slices so a stop signal is
    /// honored promptly.
    async fn idle_sleep(&self, stop: &AtomicBool) {
        let deadline = Instant::now() + Duration::from_secs(self.config.sleep_secs);
        while Instant::now() < deadline && !stop.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Unique worker identity: `host-pid-random`.
fn derive_worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let pid = std::process::id();
    let nonce: u16 = rand::thread_rng().gen();
    format!("{host}-{pid}-{nonce:04x}")
}
