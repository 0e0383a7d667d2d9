//! The durable work queue facade.
//!
//! Wraps the store's queue operations with the optional [`ReadyIndex`]
//! accelerator and per-transition metrics. All correctness-bearing logic
//! lives in the store's conditional updates; this layer never makes a
//! scheduling decision the store could contradict.

use std::sync::Arc;

use metrics::counter;
use switchboard_core::QueueJob;

use crate::error::Result;
use crate::index::ReadyIndex;
use crate::store::Store;

/// Durable queue with leased batch dequeue.
pub struct Queue {
    store: Arc<Store>,
    index: Option<Arc<ReadyIndex>>,
}

impl Queue {
    pub fn new(store: Arc<Store>, index: Option<Arc<ReadyIndex>>) -> Self {
        Queue { store, index }
    }

    /// Create one pending job, scheduled `delay_secs` from now.
    pub fn enqueue(
        &self,
        event_id: i64,
        platform_id: i64,
        delay_secs: i64,
        max_retries: u32,
    ) -> Result<i64> {
        let (job_id, process_after) =
            self.store
                .insert_job(event_id, platform_id, delay_secs, max_retries)?;
        if let Some(index) = &self.index {
            index.insert(process_after, job_id);
        }
        counter!("queue_jobs_enqueued_total").increment(1);
        Ok(job_id)
    }

    /// Atomically lease up to `batch_size` due jobs for `worker_id`.
    ///
    /// When the index is present and reports nothing due, the store probe is
    /// skipped entirely; a stale index can only delay work by one poll, the
    /// periodic reaper path always consults the store.
    pub fn lease_batch(
        &self,
        worker_id: &str,
        batch_size: usize,
        lease_secs: i64,
    ) -> Result<Vec<QueueJob>> {
        if let Some(index) = &self.index {
            let now = chrono::Utc::now().timestamp();
            if !index.has_ready(now) {
                return Ok(Vec::new());
            }
            // Consume the hints; the conditional claim below is what counts.
            index.take_ready(now, batch_size);
        }
        let leased = self.store.lease_jobs(worker_id, batch_size, lease_secs)?;
        if !leased.is_empty() {
            counter!("worker_batches_total").increment(1);
            metrics::gauge!("worker_batch_size_last").set(leased.len() as f64);
        }
        Ok(leased)
    }

    /// Return an unprocessed leased job to pending (shutdown path).
    pub fn release(&self, job: &QueueJob, worker_id: &str) -> Result<bool> {
        let released = self.store.release_job(job.id, worker_id)?;
        if released {
            if let Some(index) = &self.index {
                index.insert(job.process_after, job.id);
            }
        }
        Ok(released)
    }

    /// Terminal success.
    pub fn complete(
        &self,
        job: &QueueJob,
        worker_id: &str,
        response_code: Option<u16>,
        response_body: Option<&str>,
    ) -> Result<bool> {
        let done = self
            .store
            .complete_job(job.id, worker_id, response_code, response_body)?;
        if done {
            counter!("queue_jobs_completed_total").increment(1);
        } else {
            tracing::warn!(
                job_id = job.id,
                worker_id,
                "complete refused: lease no longer held"
            );
        }
        Ok(done)
    }

    /// Terminal failure (retry budget spent or error non-retryable).
    pub fn fail(&self, job: &QueueJob, worker_id: &str, error: &str) -> Result<bool> {
        let done = self.store.fail_job(job.id, worker_id, error)?;
        if done {
            counter!("queue_jobs_failed_total").increment(1);
        }
        Ok(done)
    }

    /// Terminal skip (platform preconditions not met).
    pub fn skip(&self, job: &QueueJob, worker_id: &str, reason: &str) -> Result<bool> {
        let done = self.store.skip_job(job.id, worker_id, reason)?;
        if done {
            counter!("queue_jobs_skipped_total", "reason" => reason.to_string()).increment(1);
        }
        Ok(done)
    }

    /// Schedule a retry with backoff. `false` when the budget is spent.
    pub fn retry(&self, job: &QueueJob, worker_id: &str) -> Result<bool> {
        match self.store.retry_job(job.id, worker_id)? {
            Some(process_after) => {
                if let Some(index) = &self.index {
                    index.insert(process_after, job.id);
                }
                counter!("queue_jobs_retried_total").increment(1);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Skip every still-pending sibling of an event; returns the count.
    pub fn cancel_siblings(&self, event_id: i64, reason: &str) -> Result<usize> {
        let skipped = self.store.cancel_sibling_jobs(event_id, reason)?;
        if skipped > 0 {
            counter!("queue_jobs_skipped_total", "reason" => reason.to_string())
                .increment(skipped as u64);
            tracing::info!(event_id, reason, skipped, "cancelled sibling jobs");
        }
        Ok(skipped)
    }

    /// Recover leases expired beyond the grace period.
    pub fn reap_stuck(&self, grace_secs: i64) -> Result<usize> {
        let reaped = self.store.reap_stuck_jobs(grace_secs)?;
        if reaped > 0 {
            counter!("queue_jobs_reaped_total").increment(reaped as u64);
            tracing::warn!(reaped, "recovered stuck leases");
        }
        Ok(reaped)
    }

    /// Operator retry of terminal failures within a window.
    pub fn retry_failed(
        &self,
        window_secs: i64,
        platform_id: Option<i64>,
        limit: Option<usize>,
        dry_run: bool,
    ) -> Result<Vec<i64>> {
        self.store
            .retry_failed_jobs(window_secs, platform_id, limit, dry_run)
    }

    /// Delete terminal jobs older than the threshold.
    pub fn cleanup(&self, older_than_secs: i64, dry_run: bool) -> Result<usize> {
        self.store.cleanup_queue(older_than_secs, dry_run)
    }

    /// Refresh queue depth gauges from the store.
    pub fn update_depth_gauges(&self) -> Result<()> {
        for (status, count) in self.store.count_jobs_by_status()? {
            match status.as_str() {
                "pending" => metrics::gauge!("queue_depth_pending").set(count as f64),
                "processing" => metrics::gauge!("queue_depth_processing").set(count as f64),
                _ => {}
            }
        }
        Ok(())
    }
}
