//! Revenue, relationships, processing log, and daily counters.

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use switchboard_core::{RevenueRecord, RevenueStatus};

use crate::error::Result;

use super::Store;

/// One processing-log row, written per adapter send.
#[derive(Debug, Clone)]
pub struct ProcessingLogEntry {
    pub event_id: i64,
    pub platform_id: i64,
    pub job_id: Option<i64>,
    pub action: String,
    /// The adapter's mapped fields, for audit only.
    pub request_fields: Option<Value>,
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
    pub success: bool,
}

impl Store {
    // =========================================================================
    // Revenue
    // =========================================================================

    /// Record revenue attributed to one (event, platform) delivery.
    pub fn record_revenue(
        &self,
        event_id: i64,
        platform_id: i64,
        gross_amount: f64,
        notes: Option<&str>,
    ) -> Result<i64> {
        let now = Self::now();
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO revenue_tracking (event_id, platform_id, gross_amount, net_amount, \
                 currency, status, notes, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?3, 'USD', 'pending', ?4, ?5, ?5)",
            params![event_id, platform_id, gross_amount, notes, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Revenue records for an event.
    pub fn revenue_for_event(&self, event_id: i64) -> Result<Vec<RevenueRecord>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT id, event_id, platform_id, gross_amount, net_amount, currency, status, \
                 notes, created_at, updated_at \
             FROM revenue_tracking WHERE event_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([event_id], |row| {
            let status: String = row.get(6)?;
            Ok(RevenueRecord {
                id: row.get(0)?,
                event_id: row.get(1)?,
                platform_id: row.get(2)?,
                gross_amount: row.get(3)?,
                net_amount: row.get(4)?,
                currency: row.get(5)?,
                status: RevenueStatus::parse(&status).unwrap_or(RevenueStatus::Pending),
                notes: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Gross revenue recorded since a timestamp.
    pub fn revenue_since(&self, since: i64) -> Result<f64> {
        let conn = self.lock_conn();
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(gross_amount), 0) FROM revenue_tracking WHERE created_at >= ?1",
            [since],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    // =========================================================================
    // Relationships
    // =========================================================================

    /// Insert a directed relationship edge if it does not exist yet.
    ///
    /// Returns `true` when the edge was created, `false` when an identical
    /// edge was already present.
    pub fn insert_relationship(
        &self,
        parent_event_id: i64,
        child_event_id: i64,
        relationship_type: &str,
        match_criteria: &Value,
    ) -> Result<bool> {
        let conn = self.lock_conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO event_relationships \
                 (parent_event_id, child_event_id, relationship_type, match_criteria, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                parent_event_id,
                child_event_id,
                relationship_type,
                match_criteria.to_string(),
                Self::now(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Relationships where the event appears as the child, as
    /// `(parent_event_id, relationship_type, match_criteria)`.
    pub fn relationships_for_child(&self, child_event_id: i64) -> Result<Vec<(i64, String, Value)>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT parent_event_id, relationship_type, match_criteria \
             FROM event_relationships WHERE child_event_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([child_event_id], |row| {
            let criteria: String = row.get(2)?;
            Ok((
                row.get(0)?,
                row.get(1)?,
                serde_json::from_str(&criteria).unwrap_or(Value::Null),
            ))
        })?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    // =========================================================================
    // Processing log
    // =========================================================================

    /// Append a processing-log row. Response bodies are truncated to keep
    /// the log bounded.
    pub fn append_processing_log(&self, entry: &ProcessingLogEntry) -> Result<()> {
        const MAX_BODY: usize = 2048;
        let body = entry.response_body.as_deref().map(|b| {
            if b.len() > MAX_BODY {
                &b[..MAX_BODY]
            } else {
                b
            }
        });
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO processing_log (event_id, platform_id, job_id, action, \
                 request_fields, response_code, response_body, success, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.event_id,
                entry.platform_id,
                entry.job_id,
                entry.action,
                entry.request_fields.as_ref().map(Value::to_string),
                entry.response_code,
                body,
                entry.success,
                Self::now(),
            ],
        )?;
        Ok(())
    }

    /// Failure rate over the trailing window: `(failures, total)`.
    pub fn processing_failure_rate(&self, window_secs: i64) -> Result<(i64, i64)> {
        let since = Self::now() - window_secs;
        let conn = self.lock_conn();
        let (failures, total): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0), COUNT(*) \
             FROM processing_log WHERE created_at >= ?1",
            [since],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((failures, total))
    }

    /// Delete log rows older than `older_than_secs`.
    pub fn prune_processing_log(&self, older_than_secs: i64, dry_run: bool) -> Result<usize> {
        let threshold = Self::now() - older_than_secs;
        let conn = self.lock_conn();
        if dry_run {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM processing_log WHERE created_at < ?1",
                [threshold],
                |row| row.get(0),
            )?;
            return Ok(count as usize);
        }
        Ok(conn.execute(
            "DELETE FROM processing_log WHERE created_at < ?1",
            [threshold],
        )?)
    }

    // =========================================================================
    // Validation daily budget
    // =========================================================================

    /// Consume one unit of today's validation budget.
    ///
    /// Returns `false` when the daily limit is already spent. The counter is
    /// persisted per day, so restarts do not reset it.
    pub fn try_consume_validation_budget(&self, day: &str, limit: u32) -> Result<bool> {
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;
        let current: i64 = tx
            .query_row(
                "SELECT count FROM validation_usage WHERE day = ?1",
                [day],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        if current >= i64::from(limit) {
            tx.commit()?;
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO validation_usage (day, count) VALUES (?1, 1) \
             ON CONFLICT(day) DO UPDATE SET count = count + 1",
            [day],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Today's key for the validation budget, UTC.
    pub fn budget_day() -> String {
        chrono::Utc::now().format("%Y-%m-%d").to_string()
    }

    // =========================================================================
    // Analytics rollup
    // =========================================================================

    /// Roll the trailing day's counters into `analytics_daily`.
    ///
    /// Operator reporting only; the pipeline never reads this table.
    pub fn rollup_analytics_day(&self, day_start: i64) -> Result<()> {
        let day_end = day_start + 86_400;
        let day = chrono::DateTime::from_timestamp(day_start, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| day_start.to_string());

        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO analytics_daily (day, events_accepted, events_blocked, \
                 jobs_completed, jobs_failed, jobs_skipped, revenue_gross, computed_at) \
             SELECT ?1, \
                 (SELECT COUNT(*) FROM events WHERE created_at >= ?2 AND created_at < ?3 \
                      AND status != 'blocked'), \
                 (SELECT COUNT(*) FROM events WHERE created_at >= ?2 AND created_at < ?3 \
                      AND status = 'blocked'), \
                 (SELECT COUNT(*) FROM processing_queue WHERE processed_at >= ?2 \
                      AND processed_at < ?3 AND status = 'completed'), \
                 (SELECT COUNT(*) FROM processing_queue WHERE processed_at >= ?2 \
                      AND processed_at < ?3 AND status = 'failed'), \
                 (SELECT COUNT(*) FROM processing_queue WHERE processed_at >= ?2 \
                      AND processed_at < ?3 AND status = 'skipped'), \
                 (SELECT COALESCE(SUM(gross_amount), 0) FROM revenue_tracking \
                      WHERE created_at >= ?2 AND created_at < ?3), \
                 ?4 \
             ON CONFLICT(day) DO UPDATE SET \
                 events_accepted = excluded.events_accepted, \
                 events_blocked = excluded.events_blocked, \
                 jobs_completed = excluded.jobs_completed, \
                 jobs_failed = excluded.jobs_failed, \
                 jobs_skipped = excluded.jobs_skipped, \
                 revenue_gross = excluded.revenue_gross, \
                 computed_at = excluded.computed_at",
            params![day, day_start, day_end, Self::now()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_core::{Event, EventType};

    fn fixture() -> (Store, i64, i64) {
        let store = Store::in_memory().unwrap();
        let mut event = Event::from_submission(EventType::Lead, &serde_json::Map::new());
        store.insert_event(&mut event).unwrap();
        let platform_id = store
            .insert_platform_raw("coregnet", "Co-Reg", "monetization", true, "{}", 10)
            .unwrap();
        (store, event.id, platform_id)
    }

    #[test]
    fn test_revenue_record_and_sum() {
        let (store, event_id, platform_id) = fixture();
        store
            .record_revenue(event_id, platform_id, 2.0, Some("coreg success"))
            .unwrap();
        store
            .record_revenue(event_id, platform_id, 1.5, None)
            .unwrap();

        let records = store.revenue_for_event(event_id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].gross_amount, 2.0);
        assert_eq!(records[0].currency, "USD");
        assert_eq!(records[0].status, RevenueStatus::Pending);
        assert_eq!(store.revenue_since(0).unwrap(), 3.5);
    }

    #[test]
    fn test_relationship_inserted_exactly_once() {
        let (store, parent, _) = fixture();
        let mut child = Event::from_submission(EventType::Purchase, &serde_json::Map::new());
        store.insert_event(&mut child).unwrap();

        let criteria = json!({"email": true, "ip": false});
        assert!(store
            .insert_relationship(parent, child.id, "lead_to_purchase", &criteria)
            .unwrap());
        assert!(!store
            .insert_relationship(parent, child.id, "lead_to_purchase", &criteria)
            .unwrap());

        let edges = store.relationships_for_child(child.id).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].0, parent);
        assert_eq!(edges[0].1, "lead_to_purchase");
        assert_eq!(edges[0].2, criteria);
    }

    #[test]
    fn test_processing_log_and_failure_rate() {
        let (store, event_id, platform_id) = fixture();
        for success in [true, true, false, true] {
            store
                .append_processing_log(&ProcessingLogEntry {
                    event_id,
                    platform_id,
                    job_id: None,
                    action: "send".into(),
                    request_fields: Some(json!({"email": "a@b.com"})),
                    response_code: Some(if success { 200 } else { 502 }),
                    response_body: Some("body".into()),
                    success,
                })
                .unwrap();
        }
        let (failures, total) = store.processing_failure_rate(300).unwrap();
        assert_eq!((failures, total), (1, 4));
    }

    #[test]
    fn test_log_body_truncated() {
        let (store, event_id, platform_id) = fixture();
        store
            .append_processing_log(&ProcessingLogEntry {
                event_id,
                platform_id,
                job_id: None,
                action: "send".into(),
                request_fields: None,
                response_code: Some(200),
                response_body: Some("x".repeat(10_000)),
                success: true,
            })
            .unwrap();
        // Prune dry-run sees it; the stored body stayed bounded.
        assert_eq!(store.prune_processing_log(-10, true).unwrap(), 1);
    }

    #[test]
    fn test_prune_processing_log() {
        let (store, event_id, platform_id) = fixture();
        store
            .append_processing_log(&ProcessingLogEntry {
                event_id,
                platform_id,
                job_id: None,
                action: "send".into(),
                request_fields: None,
                response_code: None,
                response_body: None,
                success: true,
            })
            .unwrap();
        assert_eq!(store.prune_processing_log(3600, false).unwrap(), 0);
        // Threshold in the future relative to the row: deleted.
        assert_eq!(store.prune_processing_log(-3600, false).unwrap(), 1);
    }

    #[test]
    fn test_validation_budget_caps_per_day() {
        let store = Store::in_memory().unwrap();
        let day = "2026-08-01";
        assert!(store.try_consume_validation_budget(day, 2).unwrap());
        assert!(store.try_consume_validation_budget(day, 2).unwrap());
        assert!(!store.try_consume_validation_budget(day, 2).unwrap());
        // A new day starts fresh.
        assert!(store.try_consume_validation_budget("2026-08-02", 2).unwrap());
    }

    #[test]
    fn test_analytics_rollup_counts() {
        let (store, event_id, platform_id) = fixture();
        let (job_id, _) = store.insert_job(event_id, platform_id, 0, 3).unwrap();
        store.lease_jobs("w1", 1, 300).unwrap();
        store.complete_job(job_id, "w1", Some(200), None).unwrap();
        store.record_revenue(event_id, platform_id, 2.0, None).unwrap();

        let now = Store::now();
        let day_start = now - now.rem_euclid(86_400);
        store.rollup_analytics_day(day_start).unwrap();
        // Re-rolling the same day upserts rather than duplicating.
        store.rollup_analytics_day(day_start).unwrap();

        let conn = store.lock_conn();
        let (accepted, completed, revenue): (i64, i64, f64) = conn
            .query_row(
                "SELECT events_accepted, jobs_completed, revenue_gross FROM analytics_daily",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(completed, 1);
        assert_eq!(revenue, 2.0);
    }
}
