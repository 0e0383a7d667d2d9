//! Platform definition and routing rule repository operations.
//!
//! `api_config` and rule `conditions` are stored as JSON text and decoded
//! exactly once here, at load.

use rusqlite::{params, Row};
use serde_json::Value;
use switchboard_core::{routing, PlatformDefinition, PlatformType, RoutingRule};

use crate::error::{Error, Result};

use super::Store;

const PLATFORM_COLUMNS: &str = "id, platform_code, display_name, platform_type, is_active, \
     api_config, timeout_secs, max_retries, retry_delay_secs, requires_valid_email, priority";

fn platform_from_row(row: &Row<'_>) -> rusqlite::Result<PlatformDefinition> {
    let platform_type: String = row.get(3)?;
    let api_config: String = row.get(5)?;
    Ok(PlatformDefinition {
        id: row.get(0)?,
        platform_code: row.get(1)?,
        display_name: row.get(2)?,
        platform_type: PlatformType::parse(&platform_type).unwrap_or(PlatformType::Crm),
        is_active: row.get(4)?,
        api_config: serde_json::from_str(&api_config).unwrap_or_default(),
        timeout_secs: row.get(6)?,
        max_retries: row.get(7)?,
        retry_delay_secs: row.get(8)?,
        requires_valid_email: row.get(9)?,
        priority: row.get(10)?,
    })
}

impl Store {
    /// Insert a platform definition, returning its id.
    pub fn insert_platform(&self, platform: &PlatformDefinition) -> Result<i64> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO platforms (platform_code, display_name, platform_type, is_active, \
                 api_config, timeout_secs, max_retries, retry_delay_secs, \
                 requires_valid_email, priority) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                platform.platform_code,
                platform.display_name,
                platform.platform_type.as_str(),
                platform.is_active,
                serde_json::to_string(&platform.api_config)?,
                platform.timeout_secs,
                platform.max_retries,
                platform.retry_delay_secs,
                platform.requires_valid_email,
                platform.priority,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List platforms, optionally only active ones, priority order.
    pub fn list_platforms(&self, active_only: bool) -> Result<Vec<PlatformDefinition>> {
        let conn = self.lock_conn();
        let sql = if active_only {
            format!(
                "SELECT {PLATFORM_COLUMNS} FROM platforms WHERE is_active = 1 \
                 ORDER BY priority ASC, id ASC"
            )
        } else {
            format!("SELECT {PLATFORM_COLUMNS} FROM platforms ORDER BY priority ASC, id ASC")
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], platform_from_row)?;
        let mut platforms = Vec::new();
        for row in rows {
            platforms.push(row?);
        }
        Ok(platforms)
    }

    /// Fetch a platform by id.
    pub fn get_platform(&self, id: i64) -> Result<Option<PlatformDefinition>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLATFORM_COLUMNS} FROM platforms WHERE id = ?1"
        ))?;
        match stmt.query_row([id], platform_from_row) {
            Ok(platform) => Ok(Some(platform)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Store(e)),
        }
    }

    /// Fetch a platform by its unique code.
    pub fn get_platform_by_code(&self, code: &str) -> Result<Option<PlatformDefinition>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLATFORM_COLUMNS} FROM platforms WHERE platform_code = ?1"
        ))?;
        match stmt.query_row([code], platform_from_row) {
            Ok(platform) => Ok(Some(platform)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Store(e)),
        }
    }

    /// Insert a routing rule. `conditions` is the on-disk key→predicate JSON.
    pub fn insert_routing_rule(
        &self,
        event_type: &str,
        platform_id: i64,
        conditions: Option<&Value>,
        priority: i64,
        is_active: bool,
    ) -> Result<i64> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO routing_rules (event_type, platform_id, conditions, priority, is_active) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event_type,
                platform_id,
                conditions.map(serde_json::Value::to_string),
                priority,
                is_active,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Load active routing rules with parsed conditions, priority order.
    ///
    /// A rule whose conditions fail to parse is skipped with a warning
    /// rather than poisoning the whole cache.
    pub fn list_routing_rules(&self) -> Result<Vec<RoutingRule>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT id, event_type, platform_id, conditions, priority, is_active \
             FROM routing_rules WHERE is_active = 1 ORDER BY priority ASC, id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let event_type: String = row.get(1)?;
            let platform_id: i64 = row.get(2)?;
            let conditions: Option<String> = row.get(3)?;
            let priority: i64 = row.get(4)?;
            let is_active: bool = row.get(5)?;
            Ok((id, event_type, platform_id, conditions, priority, is_active))
        })?;

        let mut rules = Vec::new();
        for row in rows {
            let (id, event_type, platform_id, conditions, priority, is_active) = row?;
            let event_type = match switchboard_core::EventType::parse(&event_type) {
                Ok(ty) => ty,
                Err(_) => {
                    tracing::warn!(rule_id = id, event_type, "rule has unknown event type");
                    continue;
                }
            };
            let raw = match &conditions {
                Some(json) => serde_json::from_str(json).unwrap_or(Value::Null),
                None => Value::Null,
            };
            match routing::parse_conditions(&raw) {
                Ok(parsed) => rules.push(RoutingRule {
                    id,
                    event_type,
                    platform_id,
                    conditions: parsed,
                    priority,
                    is_active,
                }),
                Err(e) => {
                    tracing::warn!(rule_id = id, error = %e, "skipping unparseable routing rule");
                }
            }
        }
        Ok(rules)
    }

    /// Per-platform job counts by status since a timestamp.
    pub fn count_deliveries_by_platform(&self, since: i64) -> Result<Vec<(String, String, i64)>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT p.platform_code, q.status, COUNT(*) \
             FROM processing_queue q JOIN platforms p ON p.id = q.platform_id \
             WHERE q.created_at >= ?1 GROUP BY p.platform_code, q.status \
             ORDER BY p.platform_code",
        )?;
        let rows = stmt.query_map([since], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Minimal platform insert used by tests and first-run seeding.
    pub fn insert_platform_raw(
        &self,
        code: &str,
        display_name: &str,
        platform_type: &str,
        is_active: bool,
        api_config: &str,
        priority: i64,
    ) -> Result<i64> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO platforms (platform_code, display_name, platform_type, is_active, \
                 api_config, priority) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![code, display_name, platform_type, is_active, api_config, priority],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Install the six canonical platform definitions as inactive
    /// placeholders, skipping codes that already exist.
    ///
    /// Operators activate and configure them out of band; tests flip
    /// `is_active` directly.
    pub fn seed_default_platforms(&self) -> Result<usize> {
        let defaults: &[(&str, &str, &str, i64)] = &[
            ("zerobounce", "ZeroBounce", "validation", 10),
            ("leadcrm", "Lead CRM", "crm", 20),
            ("segmentio", "Segment Analytics", "analytics", 30),
            ("smsoptin", "SMS Opt-In", "sms", 40),
            ("coregnet", "Co-Reg Network", "monetization", 50),
            ("mailsync", "Mail List Sync", "email", 60),
        ];

        let mut inserted = 0;
        for (code, name, platform_type, priority) in defaults {
            if self.get_platform_by_code(code)?.is_none() {
                self.insert_platform_raw(code, name, platform_type, false, "{}", *priority)?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_load_platform() {
        let store = Store::in_memory().unwrap();
        let platform = PlatformDefinition {
            id: 0,
            platform_code: "zerobounce".into(),
            display_name: "ZeroBounce".into(),
            platform_type: PlatformType::Validation,
            is_active: true,
            api_config: json!({"api_key": "k", "api_config": {"endpoint": "https://zb"}})
                .as_object()
                .cloned()
                .unwrap(),
            timeout_secs: 15,
            max_retries: 2,
            retry_delay_secs: 1,
            requires_valid_email: false,
            priority: 5,
        };
        let id = store.insert_platform(&platform).unwrap();

        let loaded = store.get_platform(id).unwrap().unwrap();
        assert_eq!(loaded.platform_code, "zerobounce");
        assert_eq!(loaded.platform_type, PlatformType::Validation);
        assert_eq!(loaded.timeout_secs, 15);
        assert!(!loaded.requires_valid_email);
        // Decoded once at load; nested config still mergeable.
        let merged = loaded.merged_config();
        assert_eq!(merged.get("endpoint"), Some(&json!("https://zb")));

        let by_code = store.get_platform_by_code("zerobounce").unwrap().unwrap();
        assert_eq!(by_code.id, id);
    }

    #[test]
    fn test_list_active_only() {
        let store = Store::in_memory().unwrap();
        store
            .insert_platform_raw("a", "A", "crm", true, "{}", 20)
            .unwrap();
        store
            .insert_platform_raw("b", "B", "sms", false, "{}", 10)
            .unwrap();

        assert_eq!(store.list_platforms(false).unwrap().len(), 2);
        let active = store.list_platforms(true).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].platform_code, "a");
    }

    #[test]
    fn test_rules_load_parsed_and_ordered() {
        let store = Store::in_memory().unwrap();
        let platform = store
            .insert_platform_raw("a", "A", "crm", true, "{}", 10)
            .unwrap();
        store
            .insert_routing_rule(
                "lead",
                platform,
                Some(&json!({"email_domain": {"not_in": ["example.com"]}})),
                20,
                true,
            )
            .unwrap();
        store
            .insert_routing_rule("lead", platform, None, 10, true)
            .unwrap();
        store
            .insert_routing_rule("lead", platform, None, 5, false)
            .unwrap();

        let rules = store.list_routing_rules().unwrap();
        assert_eq!(rules.len(), 2, "inactive rule excluded");
        assert_eq!(rules[0].priority, 10);
        assert_eq!(rules[1].priority, 20);
        assert_eq!(rules[1].conditions.len(), 1);
    }

    #[test]
    fn test_unparseable_rule_skipped() {
        let store = Store::in_memory().unwrap();
        let platform = store
            .insert_platform_raw("a", "A", "crm", true, "{}", 10)
            .unwrap();
        store
            .insert_routing_rule(
                "lead",
                platform,
                Some(&json!({"source": {"bogus_op": 1}})),
                10,
                true,
            )
            .unwrap();
        store
            .insert_routing_rule("lead", platform, None, 20, true)
            .unwrap();

        let rules = store.list_routing_rules().unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_seed_defaults_idempotent() {
        let store = Store::in_memory().unwrap();
        assert_eq!(store.seed_default_platforms().unwrap(), 6);
        assert_eq!(store.seed_default_platforms().unwrap(), 0);
        // Seeded platforms are inactive placeholders.
        assert!(store.list_platforms(true).unwrap().is_empty());
        assert_eq!(store.list_platforms(false).unwrap().len(), 6);
    }
}
