//! Durable work queue operations.
//!
//! Correctness rests on conditional updates: every transition out of
//! `processing` is scoped by `locked_by = worker AND status = 'processing'`,
//! so a worker whose lease expired cannot overwrite a later holder's state.
//! The batch lease runs in one transaction: select candidates, claim them,
//! read them back.
//!
//! `attempts` counts finished executions: `complete` and `retry` record the
//! attempt that just ran; a terminal `fail` leaves the count at the retry
//! budget, and a reaped lease records nothing (the attempt never finished).

use rusqlite::{params, Row};
use switchboard_core::{backoff_delay_secs, JobStatus, QueueJob};

use crate::error::{Error, Result};

use super::Store;

const JOB_COLUMNS: &str = "id, event_id, platform_id, status, attempts, max_retries, \
     process_after, locked_until, locked_by, response_code, response_body, \
     revenue_amount, revenue_status, skip_reason, created_at, processed_at";

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<QueueJob> {
    let status: String = row.get(3)?;
    Ok(QueueJob {
        id: row.get(0)?,
        event_id: row.get(1)?,
        platform_id: row.get(2)?,
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
        attempts: row.get(4)?,
        max_retries: row.get(5)?,
        process_after: row.get(6)?,
        locked_until: row.get(7)?,
        locked_by: row.get(8)?,
        response_code: row.get(9)?,
        response_body: row.get(10)?,
        revenue_amount: row.get(11)?,
        revenue_status: row.get(12)?,
        skip_reason: row.get(13)?,
        created_at: row.get(14)?,
        processed_at: row.get(15)?,
    })
}

impl Store {
    /// Insert a pending job. Returns `(job_id, process_after)`.
    pub fn insert_job(
        &self,
        event_id: i64,
        platform_id: i64,
        delay_secs: i64,
        max_retries: u32,
    ) -> Result<(i64, i64)> {
        let now = Self::now();
        let process_after = now + delay_secs.max(0);
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO processing_queue \
                 (event_id, platform_id, status, attempts, max_retries, process_after, created_at) \
             VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5)",
            params![event_id, platform_id, max_retries, process_after, now],
        )?;
        Ok((conn.last_insert_rowid(), process_after))
    }

    /// Fetch a job by id.
    pub fn get_job(&self, id: i64) -> Result<Option<QueueJob>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM processing_queue WHERE id = ?1"
        ))?;
        match stmt.query_row([id], job_from_row) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Store(e)),
        }
    }

    /// All jobs for an event, oldest first.
    pub fn jobs_for_event(&self, event_id: i64) -> Result<Vec<QueueJob>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM processing_queue WHERE event_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([event_id], job_from_row)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    /// Atomically claim up to `batch_size` ready jobs for `worker_id`.
    ///
    /// Candidates are pending, due, and unleased (or lease-expired), ordered
    /// by `(process_after, id)`. The select and the claim run in the same
    /// transaction; the conditional `status = 'pending'` in the claim keeps
    /// a concurrent lease from double-claiming a row.
    pub fn lease_jobs(
        &self,
        worker_id: &str,
        batch_size: usize,
        lease_secs: i64,
    ) -> Result<Vec<QueueJob>> {
        let now = Self::now();
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;

        let candidate_ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM processing_queue \
                 WHERE status = 'pending' AND process_after <= ?1 \
                   AND (locked_until IS NULL OR locked_until < ?1) \
                 ORDER BY process_after ASC, id ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![now, batch_size as i64], |row| row.get(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };

        let mut leased = Vec::with_capacity(candidate_ids.len());
        {
            let mut claim = tx.prepare(
                "UPDATE processing_queue \
                 SET status = 'processing', locked_by = ?1, locked_until = ?2 \
                 WHERE id = ?3 AND status = 'pending'",
            )?;
            let mut fetch = tx.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM processing_queue WHERE id = ?1"
            ))?;
            for id in candidate_ids {
                let claimed = claim.execute(params![worker_id, now + lease_secs, id])?;
                if claimed == 1 {
                    leased.push(fetch.query_row([id], job_from_row)?);
                }
            }
        }

        tx.commit()?;
        Ok(leased)
    }

    /// Return a leased job to pending without recording an attempt.
    pub fn release_job(&self, job_id: i64, worker_id: &str) -> Result<bool> {
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE processing_queue \
             SET status = 'pending', locked_by = NULL, locked_until = NULL \
             WHERE id = ?1 AND locked_by = ?2 AND status = 'processing'",
            params![job_id, worker_id],
        )?;
        Ok(updated == 1)
    }

    /// Terminal success. Records the response and the finished attempt.
    ///
    /// Returns `false` when the caller no longer holds the lease.
    pub fn complete_job(
        &self,
        job_id: i64,
        worker_id: &str,
        response_code: Option<u16>,
        response_body: Option<&str>,
    ) -> Result<bool> {
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE processing_queue \
             SET status = 'completed', attempts = attempts + 1, response_code = ?1, \
                 response_body = ?2, processed_at = ?3, locked_by = NULL, locked_until = NULL \
             WHERE id = ?4 AND locked_by = ?5 AND status = 'processing'",
            params![response_code, response_body, Self::now(), job_id, worker_id],
        )?;
        Ok(updated == 1)
    }

    /// Terminal failure after the retry budget is spent.
    pub fn fail_job(&self, job_id: i64, worker_id: &str, error: &str) -> Result<bool> {
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE processing_queue \
             SET status = 'failed', response_body = ?1, processed_at = ?2, \
                 locked_by = NULL, locked_until = NULL \
             WHERE id = ?3 AND locked_by = ?4 AND status = 'processing'",
            params![error, Self::now(), job_id, worker_id],
        )?;
        Ok(updated == 1)
    }

    /// Terminal skip of a leased job (platform preconditions not met).
    pub fn skip_job(&self, job_id: i64, worker_id: &str, reason: &str) -> Result<bool> {
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE processing_queue \
             SET status = 'skipped', skip_reason = ?1, processed_at = ?2, \
                 locked_by = NULL, locked_until = NULL \
             WHERE id = ?3 AND locked_by = ?4 AND status = 'processing'",
            params![reason, Self::now(), job_id, worker_id],
        )?;
        Ok(updated == 1)
    }

    /// Schedule a retry with exponential backoff.
    ///
    /// Returns `Ok(None)` when the retry budget is exhausted (caller should
    /// fail the job instead); otherwise the new `process_after`.
    pub fn retry_job(&self, job_id: i64, worker_id: &str) -> Result<Option<i64>> {
        let now = Self::now();
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;

        let (attempts, max_retries): (u32, u32) = match tx.query_row(
            "SELECT attempts, max_retries FROM processing_queue \
             WHERE id = ?1 AND locked_by = ?2 AND status = 'processing'",
            params![job_id, worker_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ) {
            Ok(pair) => pair,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(Error::Store(e)),
        };

        if attempts >= max_retries {
            tx.commit()?;
            return Ok(None);
        }

        let process_after = now + backoff_delay_secs(attempts);
        tx.execute(
            "UPDATE processing_queue \
             SET status = 'pending', attempts = attempts + 1, process_after = ?1, \
                 locked_by = NULL, locked_until = NULL \
             WHERE id = ?2 AND locked_by = ?3 AND status = 'processing'",
            params![process_after, job_id, worker_id],
        )?;
        tx.commit()?;
        Ok(Some(process_after))
    }

    /// Skip every still-pending sibling job of an event, in one statement.
    ///
    /// Returns the number of jobs skipped (rows-affected; no follow-up count
    /// query).
    pub fn cancel_sibling_jobs(&self, event_id: i64, reason: &str) -> Result<usize> {
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE processing_queue \
             SET status = 'skipped', skip_reason = ?1, processed_at = ?2, \
                 locked_by = NULL, locked_until = NULL \
             WHERE event_id = ?3 AND status = 'pending'",
            params![reason, Self::now(), event_id],
        )?;
        Ok(updated)
    }

    /// Recover jobs whose lease expired more than `grace_secs` ago.
    pub fn reap_stuck_jobs(&self, grace_secs: i64) -> Result<usize> {
        let now = Self::now();
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE processing_queue \
             SET status = 'pending', locked_by = NULL, locked_until = NULL \
             WHERE status = 'processing' AND locked_until < ?1",
            params![now - grace_secs],
        )?;
        Ok(updated)
    }

    /// Re-activate terminally failed jobs within a window, retry semantics.
    ///
    /// Honors the remaining retry budget and the backoff law. Returns the
    /// job ids that were (or with `dry_run`, would be) rescheduled.
    pub fn retry_failed_jobs(
        &self,
        window_secs: i64,
        platform_id: Option<i64>,
        limit: Option<usize>,
        dry_run: bool,
    ) -> Result<Vec<i64>> {
        let now = Self::now();
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;

        let candidates: Vec<(i64, u32)> = {
            let mut sql = String::from(
                "SELECT id, attempts FROM processing_queue \
                 WHERE status = 'failed' AND attempts < max_retries \
                   AND COALESCE(processed_at, created_at) >= ?1",
            );
            if platform_id.is_some() {
                sql.push_str(" AND platform_id = ?2");
            }
            sql.push_str(" ORDER BY id ASC");
            let mut stmt = tx.prepare(&sql)?;
            let map = |row: &Row<'_>| Ok((row.get(0)?, row.get(1)?));
            let rows = match platform_id {
                Some(pid) => stmt.query_map(params![now - window_secs, pid], map)?,
                None => stmt.query_map(params![now - window_secs], map)?,
            };
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            if let Some(limit) = limit {
                out.truncate(limit);
            }
            out
        };

        let mut rescheduled = Vec::with_capacity(candidates.len());
        if !dry_run {
            let mut stmt = tx.prepare(
                "UPDATE processing_queue \
                 SET status = 'pending', attempts = attempts + 1, process_after = ?1, \
                     response_body = NULL, processed_at = NULL \
                 WHERE id = ?2 AND status = 'failed'",
            )?;
            for (id, attempts) in &candidates {
                let process_after = now + backoff_delay_secs(*attempts);
                if stmt.execute(params![process_after, id])? == 1 {
                    rescheduled.push(*id);
                }
            }
        } else {
            rescheduled.extend(candidates.iter().map(|(id, _)| *id));
        }

        tx.commit()?;
        Ok(rescheduled)
    }

    /// Delete terminal jobs older than `older_than_secs`.
    pub fn cleanup_queue(&self, older_than_secs: i64, dry_run: bool) -> Result<usize> {
        let threshold = Self::now() - older_than_secs;
        let conn = self.lock_conn();
        if dry_run {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM processing_queue \
                 WHERE status IN ('completed', 'failed', 'skipped') AND created_at < ?1",
                params![threshold],
                |row| row.get(0),
            )?;
            return Ok(count as usize);
        }
        let deleted = conn.execute(
            "DELETE FROM processing_queue \
             WHERE status IN ('completed', 'failed', 'skipped') AND created_at < ?1",
            params![threshold],
        )?;
        Ok(deleted)
    }

    /// Job counts by status, for health and stats reporting.
    pub fn count_jobs_by_status(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.lock_conn();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM processing_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Number of pending jobs (queue backlog, for the health check).
    pub fn pending_job_count(&self) -> Result<i64> {
        let conn = self.lock_conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM processing_queue WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Record attributed revenue on a job row (for audit alongside
    /// `revenue_tracking`).
    pub fn set_job_revenue(&self, job_id: i64, amount: f64, status: &str) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE processing_queue SET revenue_amount = ?1, revenue_status = ?2 WHERE id = ?3",
            params![amount, status, job_id],
        )?;
        Ok(())
    }
}


#[cfg(test)]
impl Store {
    /// Force a job's lease into the past.
    pub(crate) fn expire_lease_for_test(&self, job_id: i64) {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE processing_queue SET locked_until = ?1 WHERE id = ?2",
            params![Self::now() - 3600, job_id],
        )
        .unwrap();
    }

    /// Make a scheduled job due now.
    pub(crate) fn make_job_due_for_test(&self, job_id: i64) {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE processing_queue SET process_after = ?1 WHERE id = ?2",
            params![Self::now() - 1, job_id],
        )
        .unwrap();
    }

    /// Overwrite a job's attempt count.
    pub(crate) fn force_attempts_for_test(&self, job_id: i64, attempts: u32) {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE processing_queue SET attempts = ?1 WHERE id = ?2",
            params![attempts, job_id],
        )
        .unwrap();
    }

    /// Backdate a job's creation time by `secs`.
    pub(crate) fn age_job_for_test(&self, job_id: i64, secs: i64) {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE processing_queue SET created_at = created_at - ?1 WHERE id = ?2",
            params![secs, job_id],
        )
        .unwrap();
    }
}
