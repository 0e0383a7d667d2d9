//! Queue job model: one intended delivery of one event to one platform.

use serde::{Deserialize, Serialize};

use crate::DEFAULT_MAX_RETRIES;

/// Scheduling state of a queue job.
///
/// `Completed`, `Failed`, and `Skipped` are terminal; `Failed` can be
/// reactivated only by an explicit operator retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "skipped" => Some(JobStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped
        )
    }
}

/// One scheduled delivery of an event to a downstream platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: i64,
    pub event_id: i64,
    pub platform_id: i64,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_retries: u32,
    /// Earliest execution time (Unix seconds).
    pub process_after: i64,
    /// Lease expiry (Unix seconds); empty when not leased.
    pub locked_until: Option<i64>,
    /// Worker identity holding the lease.
    pub locked_by: Option<String>,
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
    pub revenue_amount: Option<f64>,
    pub revenue_status: Option<String>,
    pub skip_reason: Option<String>,
    pub created_at: i64,
    pub processed_at: Option<i64>,
}

impl QueueJob {
    /// A fresh pending job for `(event, platform)`, scheduled at `process_after`.
    pub fn new(event_id: i64, platform_id: i64, process_after: i64, created_at: i64) -> Self {
        QueueJob {
            id: 0,
            event_id,
            platform_id,
            status: JobStatus::Pending,
            attempts: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            process_after,
            locked_until: None,
            locked_by: None,
            response_code: None,
            response_body: None,
            revenue_amount: None,
            revenue_status: None,
            skip_reason: None,
            created_at,
            processed_at: None,
        }
    }

    /// Whether another retry is allowed.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_retries
    }
}

/// Retry backoff: `5 * 2^attempts` minutes, capped at 120 minutes.
///
/// `attempts` is the attempt count *before* the retry's increment, so the
/// first retry waits 5 minutes, the second 10, and so on.
pub fn backoff_delay_secs(attempts: u32) -> i64 {
    let minutes = 5i64.saturating_mul(1i64 << attempts.min(10));
    minutes.min(120) * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay_secs(0), 5 * 60);
        assert_eq!(backoff_delay_secs(1), 10 * 60);
        assert_eq!(backoff_delay_secs(2), 20 * 60);
        assert_eq!(backoff_delay_secs(3), 40 * 60);
        assert_eq!(backoff_delay_secs(4), 80 * 60);
        assert_eq!(backoff_delay_secs(5), 120 * 60);
        assert_eq!(backoff_delay_secs(30), 120 * 60);
    }

    #[test]
    fn test_backoff_monotonic() {
        let mut prev = 0;
        for attempts in 0..12 {
            let delay = backoff_delay_secs(attempts);
            assert!(delay >= prev, "backoff shrank at attempt {attempts}");
            prev = delay;
        }
    }

    #[test]
    fn test_new_job_defaults() {
        let job = QueueJob::new(7, 3, 1_700_000_000, 1_700_000_000);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_retries, 3);
        assert!(job.locked_by.is_none());
        assert!(job.can_retry());
    }

    #[test]
    fn test_can_retry_at_cap() {
        let mut job = QueueJob::new(1, 1, 0, 0);
        job.attempts = job.max_retries;
        assert!(!job.can_retry());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Skipped.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for st in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Skipped,
        ] {
            assert_eq!(JobStatus::parse(st.as_str()).unwrap(), st);
        }
        assert!(JobStatus::parse("paused").is_none());
    }
}
