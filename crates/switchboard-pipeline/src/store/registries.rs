//! Bot and email-validation registry repository operations.
//!
//! Registries are read-mostly secondary indices consulted at intake. Writes
//! are domain-specific upserts: honeypot hits merge into an existing entry,
//! validation verdicts bump counts and record status flips.

use rusqlite::{params, OptionalExtension, Row};
use serde_json::json;
use switchboard_core::{
    email_fingerprint, normalize_email, BotEntry, BotIdentifierType, BotSeverity,
    EmailValidationEntry, EmailValidationStatus,
};

use crate::error::Result;

use super::Store;

const BOT_COLUMNS: &str = "id, identifier_type, identifier_value, detection_method, \
     honeypot_fields, attempt_count, severity, associated_emails, associated_phones, \
     associated_ips, first_seen, last_seen";

fn bot_from_row(row: &Row<'_>) -> rusqlite::Result<BotEntry> {
    let identifier_type: String = row.get(1)?;
    let honeypot_fields: String = row.get(4)?;
    let severity: String = row.get(6)?;
    let emails: String = row.get(7)?;
    let phones: String = row.get(8)?;
    let ips: String = row.get(9)?;
    Ok(BotEntry {
        id: row.get(0)?,
        identifier_type: BotIdentifierType::parse(&identifier_type)
            .unwrap_or(BotIdentifierType::Email),
        identifier_value: row.get(2)?,
        detection_method: row.get(3)?,
        honeypot_fields: serde_json::from_str(&honeypot_fields).unwrap_or_default(),
        attempt_count: row.get(5)?,
        severity: BotSeverity::parse(&severity).unwrap_or(BotSeverity::Low),
        associated_emails: serde_json::from_str(&emails).unwrap_or_default(),
        associated_phones: serde_json::from_str(&phones).unwrap_or_default(),
        associated_ips: serde_json::from_str(&ips).unwrap_or_default(),
        first_seen: row.get(10)?,
        last_seen: row.get(11)?,
    })
}

const VALIDATION_COLUMNS: &str = "id, email, email_md5, status, substatus, raw_status, \
     raw_substatus, active_in_days, free_email, mx_found, validation_count, \
     first_validated_at, last_validated_at, first_seen_valid_at, first_seen_invalid_at";

fn validation_from_row(row: &Row<'_>) -> rusqlite::Result<EmailValidationEntry> {
    let status: String = row.get(3)?;
    Ok(EmailValidationEntry {
        id: row.get(0)?,
        email: row.get(1)?,
        email_md5: row.get(2)?,
        status: EmailValidationStatus::parse(&status).unwrap_or(EmailValidationStatus::Unknown),
        substatus: row.get(4)?,
        raw_status: row.get(5)?,
        raw_substatus: row.get(6)?,
        active_in_days: row.get(7)?,
        free_email: row.get(8)?,
        mx_found: row.get(9)?,
        validation_count: row.get(10)?,
        first_validated_at: row.get(11)?,
        last_validated_at: row.get(12)?,
        first_seen_valid_at: row.get(13)?,
        first_seen_invalid_at: row.get(14)?,
    })
}

fn merge_into(set: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value {
        if !value.is_empty() && !set.iter().any(|v| v == value) {
            set.push(value.to_string());
        }
    }
}

impl Store {
    // =========================================================================
    // Bot registry
    // =========================================================================

    /// Fetch a bot entry by its primary key.
    pub fn find_bot(
        &self,
        identifier_type: BotIdentifierType,
        value: &str,
    ) -> Result<Option<BotEntry>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOT_COLUMNS} FROM bot_registry \
             WHERE identifier_type = ?1 AND identifier_value = ?2"
        ))?;
        let entry = stmt
            .query_row(params![identifier_type.as_str(), value], bot_from_row)
            .optional()?;
        Ok(entry)
    }

    /// Whether any of the given identifiers is known, either as a primary
    /// key or inside another entry's associated sets.
    pub fn is_known_bot(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        ip: Option<&str>,
    ) -> Result<bool> {
        let conn = self.lock_conn();
        let check = |identifier_type: &str, column: &str, value: &str| -> Result<bool> {
            // Associated sets are JSON arrays; the quoted-needle LIKE finds
            // exact members without unpacking the column.
            let needle = format!("%{}%", json!(value));
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM bot_registry \
                     WHERE (identifier_type = ?1 AND identifier_value = ?2) \
                        OR {column} LIKE ?3"
                ),
                params![identifier_type, value, needle],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        };

        if let Some(email) = email.filter(|e| !e.is_empty()) {
            if check("email", "associated_emails", email)? {
                return Ok(true);
            }
        }
        if let Some(phone) = phone.filter(|p| !p.is_empty()) {
            if check("phone", "associated_phones", phone)? {
                return Ok(true);
            }
        }
        if let Some(ip) = ip.filter(|i| !i.is_empty()) {
            if check("ip", "associated_ips", ip)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Record a honeypot hit, keyed primarily by email, falling back to IP.
    ///
    /// Creates the entry on first sight; afterwards bumps the attempt count,
    /// merges honeypot fields and associated identifiers, and promotes
    /// severity by count.
    pub fn record_honeypot_bot(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        ip: Option<&str>,
        honeypot_fields: &[String],
    ) -> Result<()> {
        let (identifier_type, identifier_value) = match (email, ip) {
            (Some(email), _) if !email.is_empty() => (BotIdentifierType::Email, email),
            (_, Some(ip)) if !ip.is_empty() => (BotIdentifierType::Ip, ip),
            _ => return Ok(()), // nothing to key on
        };

        let now = Self::now();
        let existing = self.find_bot(identifier_type, identifier_value)?;

        match existing {
            Some(mut entry) => {
                entry.attempt_count += 1;
                entry.severity = BotSeverity::for_attempts(entry.attempt_count);
                for field in honeypot_fields {
                    merge_into(&mut entry.honeypot_fields, Some(field));
                }
                merge_into(&mut entry.associated_emails, email);
                merge_into(&mut entry.associated_phones, phone);
                merge_into(&mut entry.associated_ips, ip);

                let conn = self.lock_conn();
                conn.execute(
                    "UPDATE bot_registry SET attempt_count = ?1, severity = ?2, \
                         honeypot_fields = ?3, associated_emails = ?4, \
                         associated_phones = ?5, associated_ips = ?6, last_seen = ?7 \
                     WHERE id = ?8",
                    params![
                        entry.attempt_count,
                        entry.severity.as_str(),
                        serde_json::to_string(&entry.honeypot_fields)?,
                        serde_json::to_string(&entry.associated_emails)?,
                        serde_json::to_string(&entry.associated_phones)?,
                        serde_json::to_string(&entry.associated_ips)?,
                        now,
                        entry.id,
                    ],
                )?;
            }
            None => {
                let mut emails = Vec::new();
                let mut phones = Vec::new();
                let mut ips = Vec::new();
                merge_into(&mut emails, email);
                merge_into(&mut phones, phone);
                merge_into(&mut ips, ip);

                let conn = self.lock_conn();
                conn.execute(
                    "INSERT INTO bot_registry (identifier_type, identifier_value, \
                         detection_method, honeypot_fields, attempt_count, severity, \
                         associated_emails, associated_phones, associated_ips, \
                         first_seen, last_seen) \
                     VALUES (?1, ?2, 'honeypot', ?3, 1, 'low', ?4, ?5, ?6, ?7, ?7)",
                    params![
                        identifier_type.as_str(),
                        identifier_value,
                        serde_json::to_string(honeypot_fields)?,
                        serde_json::to_string(&emails)?,
                        serde_json::to_string(&phones)?,
                        serde_json::to_string(&ips)?,
                        now,
                    ],
                )?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Email validation registry
    // =========================================================================

    /// Look up the cached verdict for an email (normalized before lookup).
    pub fn find_email_validation(&self, email: &str) -> Result<Option<EmailValidationEntry>> {
        let normalized = normalize_email(email);
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VALIDATION_COLUMNS} FROM email_validation_registry WHERE email = ?1"
        ))?;
        let entry = stmt.query_row([normalized], validation_from_row).optional()?;
        Ok(entry)
    }

    /// Record a validation verdict, creating or refreshing the cache entry.
    ///
    /// Status flips are appended to the entry's history; first-seen
    /// valid/invalid timestamps are set once and kept.
    #[allow(clippy::too_many_arguments)]
    pub fn record_email_validation(
        &self,
        email: &str,
        status: EmailValidationStatus,
        substatus: Option<&str>,
        raw_status: Option<&str>,
        raw_substatus: Option<&str>,
        active_in_days: Option<i64>,
        free_email: Option<bool>,
        mx_found: Option<bool>,
    ) -> Result<()> {
        let normalized = normalize_email(email);
        if normalized.is_empty() {
            return Ok(());
        }
        let fingerprint = email_fingerprint(&normalized);
        let now = Self::now();
        let is_valid_side = status.is_deliverable();

        let existing = self.find_email_validation(&normalized)?;
        let conn = self.lock_conn();
        match existing {
            Some(entry) => {
                let status_changed = entry.status != status;
                conn.execute(
                    "UPDATE email_validation_registry SET status = ?1, substatus = ?2, \
                         raw_status = ?3, raw_substatus = ?4, active_in_days = ?5, \
                         free_email = COALESCE(?6, free_email), \
                         mx_found = COALESCE(?7, mx_found), \
                         validation_count = validation_count + 1, last_validated_at = ?8, \
                         first_seen_valid_at = COALESCE(first_seen_valid_at, ?9), \
                         first_seen_invalid_at = COALESCE(first_seen_invalid_at, ?10), \
                         status_history = CASE WHEN ?11 THEN \
                             json_insert(status_history, '$[#]', \
                                 json_object('from', ?12, 'to', ?13, 'at', ?8)) \
                             ELSE status_history END \
                     WHERE id = ?14",
                    params![
                        status.as_str(),
                        substatus,
                        raw_status,
                        raw_substatus,
                        active_in_days,
                        free_email,
                        mx_found,
                        now,
                        is_valid_side.then_some(now),
                        (!is_valid_side).then_some(now),
                        status_changed,
                        entry.status.as_str(),
                        status.as_str(),
                        entry.id,
                    ],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO email_validation_registry (email, email_md5, status, \
                         substatus, raw_status, raw_substatus, active_in_days, free_email, \
                         mx_found, validation_count, first_validated_at, last_validated_at, \
                         first_seen_valid_at, first_seen_invalid_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10, ?11, ?12)",
                    params![
                        normalized,
                        fingerprint,
                        status.as_str(),
                        substatus,
                        raw_status,
                        raw_substatus,
                        active_in_days,
                        free_email,
                        mx_found,
                        now,
                        is_valid_side.then_some(now),
                        (!is_valid_side).then_some(now),
                    ],
                )?;
            }
        }
        Ok(())
    }
}
