//! Registry value types: bot identifiers and email validation cache entries.

use serde::{Deserialize, Serialize};

use crate::event::EmailValidationStatus;

/// Which identifier a bot registry entry is keyed by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BotIdentifierType {
    Email,
    Phone,
    Ip,
}

impl BotIdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotIdentifierType::Email => "email",
            BotIdentifierType::Phone => "phone",
            BotIdentifierType::Ip => "ip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(BotIdentifierType::Email),
            "phone" => Some(BotIdentifierType::Phone),
            "ip" => Some(BotIdentifierType::Ip),
            _ => None,
        }
    }
}

/// Severity of a bot registry entry, promoted by attempt count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BotSeverity {
    Low,
    Medium,
    High,
}

impl BotSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotSeverity::Low => "low",
            BotSeverity::Medium => "medium",
            BotSeverity::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(BotSeverity::Low),
            "medium" => Some(BotSeverity::Medium),
            "high" => Some(BotSeverity::High),
            _ => None,
        }
    }

    /// Severity for a given attempt count: ≥10 high, ≥5 medium, else low.
    pub fn for_attempts(attempts: u32) -> Self {
        if attempts >= 10 {
            BotSeverity::High
        } else if attempts >= 5 {
            BotSeverity::Medium
        } else {
            BotSeverity::Low
        }
    }
}

/// A bot registry entry.
///
/// Keyed by `(identifier_type, identifier_value)`; the associated sets carry
/// identifiers co-occurring in the same submissions so one flagged email can
/// condemn its sibling phone and IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotEntry {
    pub id: i64,
    pub identifier_type: BotIdentifierType,
    pub identifier_value: String,
    pub detection_method: String,
    /// Honeypot field names observed in the triggering submissions.
    pub honeypot_fields: Vec<String>,
    pub attempt_count: u32,
    pub severity: BotSeverity,
    pub associated_emails: Vec<String>,
    pub associated_phones: Vec<String>,
    pub associated_ips: Vec<String>,
    pub first_seen: i64,
    pub last_seen: i64,
}

/// Substatuses that mark a mailbox permanently invalid.
///
/// Entries carrying one of these are never revalidated, regardless of cache
/// age.
pub const PERMANENT_INVALID_SUBSTATUSES: &[&str] =
    &["mailbox_not_found", "mailbox_invalid", "no_dns_entries"];

pub fn is_permanent_invalid_substatus(substatus: &str) -> bool {
    PERMANENT_INVALID_SUBSTATUSES.contains(&substatus)
}

/// A cached email validation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailValidationEntry {
    pub id: i64,
    /// Normalized (trimmed, lowercased) email.
    pub email: String,
    pub email_md5: String,
    pub status: EmailValidationStatus,
    pub substatus: Option<String>,
    /// Raw provider status string, before canonical mapping.
    pub raw_status: Option<String>,
    pub raw_substatus: Option<String>,
    /// Days since the mailbox was last seen active.
    pub active_in_days: Option<i64>,
    pub free_email: Option<bool>,
    pub mx_found: Option<bool>,
    pub validation_count: u32,
    pub first_validated_at: i64,
    pub last_validated_at: i64,
    pub first_seen_valid_at: Option<i64>,
    pub first_seen_invalid_at: Option<i64>,
}

impl EmailValidationEntry {
    /// Whether the cached verdict is stale and eligible for revalidation.
    ///
    /// Permanently invalid mailboxes never revalidate.
    pub fn needs_revalidation(&self, now: i64, ttl_days: i64) -> bool {
        if self
            .substatus
            .as_deref()
            .is_some_and(is_permanent_invalid_substatus)
        {
            return false;
        }
        now - self.last_validated_at > ttl_days * 86_400
    }
}

/// Map a provider (ZeroBounce-shaped) status string to the canonical verdict.
pub fn map_zerobounce_status(raw: &str) -> EmailValidationStatus {
    match raw.trim().to_lowercase().as_str() {
        "valid" => EmailValidationStatus::Valid,
        "invalid" | "spamtrap" | "abuse" | "do_not_mail" | "toxic" => {
            EmailValidationStatus::Invalid
        }
        "catch-all" => EmailValidationStatus::CatchAll,
        "role" => EmailValidationStatus::Role,
        "disposable" => EmailValidationStatus::Disposable,
        _ => EmailValidationStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_promotion_thresholds() {
        assert_eq!(BotSeverity::for_attempts(0), BotSeverity::Low);
        assert_eq!(BotSeverity::for_attempts(4), BotSeverity::Low);
        assert_eq!(BotSeverity::for_attempts(5), BotSeverity::Medium);
        assert_eq!(BotSeverity::for_attempts(9), BotSeverity::Medium);
        assert_eq!(BotSeverity::for_attempts(10), BotSeverity::High);
        assert_eq!(BotSeverity::for_attempts(100), BotSeverity::High);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(BotSeverity::Low < BotSeverity::Medium);
        assert!(BotSeverity::Medium < BotSeverity::High);
    }

    #[test]
    fn test_zerobounce_status_mapping() {
        use EmailValidationStatus::*;
        let cases = [
            ("valid", Valid),
            ("invalid", Invalid),
            ("catch-all", CatchAll),
            ("unknown", Unknown),
            ("spamtrap", Invalid),
            ("abuse", Invalid),
            ("do_not_mail", Invalid),
            ("toxic", Invalid),
            ("role", Role),
            ("disposable", Disposable),
            ("something_new", Unknown),
            ("", Unknown),
        ];
        for (raw, expected) in cases {
            assert_eq!(map_zerobounce_status(raw), expected, "raw={raw:?}");
        }
    }

    #[test]
    fn test_mapping_is_case_and_whitespace_tolerant() {
        assert_eq!(
            map_zerobounce_status(" Valid "),
            EmailValidationStatus::Valid
        );
        assert_eq!(
            map_zerobounce_status("Catch-All"),
            EmailValidationStatus::CatchAll
        );
    }

    #[test]
    fn test_permanent_invalid_substatuses() {
        assert!(is_permanent_invalid_substatus("mailbox_not_found"));
        assert!(is_permanent_invalid_substatus("mailbox_invalid"));
        assert!(is_permanent_invalid_substatus("no_dns_entries"));
        assert!(!is_permanent_invalid_substatus("greylisted"));
    }

    fn entry(last_validated_at: i64, substatus: Option<&str>) -> EmailValidationEntry {
        EmailValidationEntry {
            id: 1,
            email: "a@b.com".into(),
            email_md5: "x".into(),
            status: EmailValidationStatus::Invalid,
            substatus: substatus.map(String::from),
            raw_status: None,
            raw_substatus: None,
            active_in_days: None,
            free_email: None,
            mx_found: None,
            validation_count: 1,
            first_validated_at: last_validated_at,
            last_validated_at,
            first_seen_valid_at: None,
            first_seen_invalid_at: Some(last_validated_at),
        }
    }

    #[test]
    fn test_needs_revalidation_after_ttl() {
        let now = 1_700_000_000;
        let fresh = entry(now - 86_400, None);
        assert!(!fresh.needs_revalidation(now, 30));

        let stale = entry(now - 31 * 86_400, None);
        assert!(stale.needs_revalidation(now, 30));
    }

    #[test]
    fn test_permanent_invalid_never_revalidates() {
        let now = 1_700_000_000;
        let stale = entry(now - 365 * 86_400, Some("mailbox_not_found"));
        assert!(!stale.needs_revalidation(now, 30));
    }

    #[test]
    fn test_identifier_type_round_trip() {
        for ty in [
            BotIdentifierType::Email,
            BotIdentifierType::Phone,
            BotIdentifierType::Ip,
        ] {
            assert_eq!(BotIdentifierType::parse(ty.as_str()).unwrap(), ty);
        }
        assert!(BotIdentifierType::parse("cookie").is_none());
    }
}
