//! The `Event` domain model and submission normalization.
//!
//! An event is one user-facing submission (lead or purchase) captured at the
//! HTTP intake. This module owns the normalization rules applied while
//! building an event from a raw submission map:
//!
//! - Email: trimmed, lowercased, fingerprinted as MD5 for registry keys
//! - Phone: digits-only, canonicalized to 11 digits with a leading `1`
//! - Name: split into first/last on the first whitespace
//! - Residual submission keys are stashed into the opaque `event_data` map

use chrono::Utc;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The kind of submission an event represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Lead,
    Purchase,
    EmailOpen,
    EmailClick,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Lead => "lead",
            EventType::Purchase => "purchase",
            EventType::EmailOpen => "email_open",
            EventType::EmailClick => "email_click",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "lead" => Ok(EventType::Lead),
            "purchase" => Ok(EventType::Purchase),
            "email_open" => Ok(EventType::EmailOpen),
            "email_click" => Ok(EventType::EmailClick),
            other => Err(Error::UnknownEventType(other.to_string())),
        }
    }
}

/// Lifecycle state of an event.
///
/// `Completed`, `Blocked`, and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Blocked,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
            EventStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EventStatus::Pending),
            "processing" => Some(EventStatus::Processing),
            "completed" => Some(EventStatus::Completed),
            "failed" => Some(EventStatus::Failed),
            "blocked" => Some(EventStatus::Blocked),
            _ => None,
        }
    }
}

/// Canonical email verdict carried on an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EmailValidationStatus {
    Valid,
    Invalid,
    CatchAll,
    Unknown,
    Role,
    Disposable,
}

impl EmailValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailValidationStatus::Valid => "valid",
            EmailValidationStatus::Invalid => "invalid",
            EmailValidationStatus::CatchAll => "catch-all",
            EmailValidationStatus::Unknown => "unknown",
            EmailValidationStatus::Role => "role",
            EmailValidationStatus::Disposable => "disposable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(EmailValidationStatus::Valid),
            "invalid" => Some(EmailValidationStatus::Invalid),
            "catch-all" => Some(EmailValidationStatus::CatchAll),
            "unknown" => Some(EmailValidationStatus::Unknown),
            "role" => Some(EmailValidationStatus::Role),
            "disposable" => Some(EmailValidationStatus::Disposable),
            _ => None,
        }
    }

    /// Whether this verdict is acceptable for downstream delivery.
    ///
    /// Catch-all and unknown mailboxes are delivered; only hard verdicts
    /// (invalid, disposable) and role accounts are withheld per-platform.
    pub fn is_deliverable(&self) -> bool {
        matches!(
            self,
            EmailValidationStatus::Valid
                | EmailValidationStatus::CatchAll
                | EmailValidationStatus::Unknown
                | EmailValidationStatus::Role
        )
    }
}

/// A single user-facing submission record.
///
/// `id` is the store's row id (0 until persisted); `event_id` is the stable
/// external UUID handed back to submitters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub event_id: String,
    pub event_type: EventType,

    pub email: Option<String>,
    pub email_md5: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub ip_address: Option<String>,

    // Acquisition block: the *first* touch, carried over from the original
    // lead when a purchase is linked.
    pub acq_source: Option<String>,
    pub acq_campaign: Option<String>,
    pub acq_term: Option<String>,
    pub acq_date: Option<String>,
    pub acq_form_title: Option<String>,

    // Current block: attribution for this submission.
    pub cur_source: Option<String>,
    pub cur_medium: Option<String>,
    pub cur_campaign: Option<String>,
    pub cur_content: Option<String>,
    pub cur_term: Option<String>,
    pub gclid: Option<String>,
    pub ga_client_id: Option<String>,

    // Purchase block: present only for purchase events.
    pub purchase_offer: Option<String>,
    pub purchase_publisher: Option<String>,
    pub purchase_amount: Option<f64>,
    pub traffic_source: Option<String>,

    pub email_validation_status: Option<EmailValidationStatus>,
    /// Days since the mailbox was last seen active, as reported by the
    /// validation platform.
    pub zb_last_active: Option<i64>,

    /// Opaque key→value map for platform-specific additions.
    pub event_data: Map<String, Value>,

    pub status: EventStatus,
    pub blocked_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Submission keys consumed into typed event fields. Anything else lands in
/// `event_data`.
const CONSUMED_KEYS: &[&str] = &[
    "email",
    "phone",
    "name",
    "first_name",
    "last_name",
    "ip",
    "source",
    "medium",
    "campaign",
    "content",
    "term",
    "gclid",
    "ga_client_id",
    "date",
    "form_title",
    "offer",
    "publisher",
    "amount",
    "traffic_source",
    "purchase_offer",
    "purchase_publisher",
    "purchase_amount",
    "redirect_url",
];

impl Event {
    /// Build an event from a raw submission map.
    ///
    /// Assigns a fresh UUID, normalizes contact fields, maps attribution
    /// fields into the acquisition block for leads and the purchase block
    /// for purchases, and stashes residual keys into `event_data`.
    ///
    /// A malformed phone is recorded as absent here; the validator surfaces
    /// the error without blocking the submission on its own.
    pub fn from_submission(event_type: EventType, raw: &Map<String, Value>) -> Self {
        let now = Utc::now().timestamp();

        let email = str_field(raw, "email").map(|e| normalize_email(&e)).filter(|e| !e.is_empty());
        let email_md5 = email.as_deref().map(email_fingerprint);

        let phone = str_field(raw, "phone").and_then(|p| canonicalize_phone(&p).ok());

        // Explicit first/last win over a combined "name".
        let (mut first_name, mut last_name) =
            (str_field(raw, "first_name"), str_field(raw, "last_name"));
        if first_name.is_none() && last_name.is_none() {
            if let Some(name) = str_field(raw, "name") {
                let (f, l) = split_name(&name);
                first_name = f;
                last_name = l;
            }
        }

        let source = str_field(raw, "source");
        let campaign = str_field(raw, "campaign");
        let term = str_field(raw, "term");

        // Lead submissions are the first touch: their attribution fields
        // seed the acquisition block directly.
        let (acq_source, acq_campaign, acq_term, acq_date, acq_form_title) =
            if event_type == EventType::Lead {
                (
                    source.clone(),
                    campaign.clone(),
                    term.clone(),
                    str_field(raw, "date"),
                    str_field(raw, "form_title"),
                )
            } else {
                (None, None, None, None, None)
            };

        let (purchase_offer, purchase_publisher, purchase_amount, traffic_source) =
            if event_type == EventType::Purchase {
                (
                    str_field(raw, "purchase_offer").or_else(|| str_field(raw, "offer")),
                    str_field(raw, "purchase_publisher").or_else(|| str_field(raw, "publisher")),
                    num_field(raw, "purchase_amount").or_else(|| num_field(raw, "amount")),
                    str_field(raw, "traffic_source"),
                )
            } else {
                (None, None, None, None)
            };

        let mut event_data = Map::new();
        for (key, value) in raw {
            if !CONSUMED_KEYS.contains(&key.as_str()) {
                event_data.insert(key.clone(), value.clone());
            }
        }

        Event {
            id: 0,
            event_id: Uuid::new_v4().to_string(),
            event_type,
            email,
            email_md5,
            phone,
            first_name,
            last_name,
            ip_address: str_field(raw, "ip"),
            acq_source,
            acq_campaign,
            acq_term,
            acq_date,
            acq_form_title,
            cur_source: source,
            cur_medium: str_field(raw, "medium"),
            cur_campaign: campaign,
            cur_content: str_field(raw, "content"),
            cur_term: term,
            gclid: str_field(raw, "gclid"),
            ga_client_id: str_field(raw, "ga_client_id"),
            purchase_offer,
            purchase_publisher,
            purchase_amount,
            traffic_source,
            email_validation_status: None,
            zb_last_active: None,
            event_data,
            status: EventStatus::Pending,
            blocked_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether every acquisition field is empty.
    ///
    /// Used by the linker to decide if a purchase should inherit the prior
    /// lead's acquisition block.
    pub fn acquisition_is_empty(&self) -> bool {
        self.acq_source.is_none()
            && self.acq_campaign.is_none()
            && self.acq_term.is_none()
            && self.acq_date.is_none()
            && self.acq_form_title.is_none()
    }

    /// Revenue amount for routing predicates: the purchase amount, 0 if absent.
    pub fn revenue_amount(&self) -> f64 {
        self.purchase_amount.unwrap_or(0.0)
    }
}

/// Trim and lowercase an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// MD5 hex digest of a normalized email, used as a registry identity key.
pub fn email_fingerprint(email: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(normalize_email(email).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonicalize a phone number to 11 digits with a leading `1`.
///
/// Strips all non-digit characters, then:
/// - 10 digits → prefixed with `1`
/// - 11 digits starting with `1` → unchanged
/// - anything else → error
pub fn canonicalize_phone(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => Ok(format!("1{digits}")),
        11 if digits.starts_with('1') => Ok(digits),
        _ => Err(Error::InvalidPhone(raw.to_string())),
    }
}

/// Split a combined name on the first whitespace run.
pub fn split_name(name: &str) -> (Option<String>, Option<String>) {
    let name = name.trim();
    if name.is_empty() {
        return (None, None);
    }
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) => (
            Some(first.to_string()),
            Some(rest.trim().to_string()).filter(|s| !s.is_empty()),
        ),
        None => (Some(name.to_string()), None),
    }
}

/// RFC-ish email format check: one `@`, non-empty local part, and a domain
/// with at least one dot and no whitespace.
pub fn is_valid_email_format(email: &str) -> bool {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
    });
    re.is_match(email)
}

/// Read a string-ish field from a submission map, trimming and dropping
/// empties. Numbers are accepted and stringified.
fn str_field(raw: &Map<String, Value>, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a numeric field, accepting both JSON numbers and numeric strings.
fn num_field(raw: &Map<String, Value>, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
