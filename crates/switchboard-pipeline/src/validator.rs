//! The intake validation gate.
//!
//! Runs before persistence and decides whether a submission enters the
//! pipeline. Checks short-circuit on bot detection; everything else
//! accumulates into the verdict's `errors` without throwing. Registry
//! side effects (recording a honeypot hit) are best-effort: a registry
//! failure is logged and the request proceeds.

use std::sync::Arc;

use metrics::counter;
use serde_json::{Map, Value};
use switchboard_core::{canonicalize_phone, is_valid_email_format, Event};

use crate::store::Store;

/// Validator knobs.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Hidden form fields a human never fills.
    pub honeypot_fields: Vec<String>,
    /// Email-validation cache TTL in days.
    pub cache_ttl_days: i64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            honeypot_fields: vec!["zipcode".to_string(), "phonenumber".to_string()],
            cache_ttl_days: switchboard_core::DEFAULT_VALIDATION_CACHE_DAYS,
        }
    }
}

/// The validator's verdict on one submission.
#[derive(Debug, Clone, Default)]
pub struct Verdict {
    /// Whether the event may enter the pipeline.
    pub valid: bool,
    pub is_bot: bool,
    /// `honeypot_triggered` or `known_bot`.
    pub bot_reason: Option<String>,
    /// Cached email verdict, if one was found.
    pub email_valid: Option<bool>,
    /// The cached canonical status backing `email_valid`.
    pub email_status: Option<switchboard_core::EmailValidationStatus>,
    /// `Some("cache")` when the email verdict came from the registry.
    pub email_validation_source: Option<&'static str>,
    /// Whether a fresh validation call should be scheduled.
    pub needs_revalidation: bool,
    pub errors: Vec<String>,
}

/// Pre-persistence submission checks.
pub struct Validator {
    store: Arc<Store>,
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(store: Arc<Store>, config: ValidatorConfig) -> Self {
        Validator { store, config }
    }

    /// Validate an event under construction against the raw submission map.
    pub fn validate(&self, event: &Event, raw: &Map<String, Value>) -> Verdict {
        let mut verdict = Verdict {
            valid: true,
            ..Verdict::default()
        };

        // 1. Honeypot: any configured field present and non-empty.
        let triggered: Vec<String> = self
            .config
            .honeypot_fields
            .iter()
            .filter(|field| {
                raw.get(field.as_str()).is_some_and(|v| match v {
                    Value::String(s) => !s.trim().is_empty(),
                    Value::Null => false,
                    _ => true,
                })
            })
            .cloned()
            .collect();
        if !triggered.is_empty() {
            verdict.valid = false;
            verdict.is_bot = true;
            verdict.bot_reason = Some("honeypot_triggered".to_string());
            counter!("intake_bots_detected_total").increment(1);

            if let Err(e) = self.store.record_honeypot_bot(
                event.email.as_deref(),
                event.phone.as_deref(),
                event.ip_address.as_deref(),
                &triggered,
            ) {
                tracing::warn!(error = %e, "failed to record honeypot bot");
            }
            return verdict;
        }

        // 2. Known bot: any identifier seen before, primary or associated.
        match self.store.is_known_bot(
            event.email.as_deref(),
            event.phone.as_deref(),
            event.ip_address.as_deref(),
        ) {
            Ok(true) => {
                verdict.valid = false;
                verdict.is_bot = true;
                verdict.bot_reason = Some("known_bot".to_string());
                counter!("intake_bots_detected_total").increment(1);
                return verdict;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "bot registry lookup failed");
            }
        }

        // 3. Cached email validity.
        if let Some(email) = event.email.as_deref() {
            match self.store.find_email_validation(email) {
                Ok(Some(entry)) => {
                    let deliverable = entry.status.is_deliverable();
                    verdict.email_valid = Some(deliverable);
                    verdict.email_status = Some(entry.status);
                    verdict.email_validation_source = Some("cache");
                    verdict.needs_revalidation =
                        entry.needs_revalidation(Store::now(), self.config.cache_ttl_days);
                    if !deliverable {
                        verdict.valid = false;
                        verdict.errors.push("Email address is invalid".to_string());
                    }
                }
                Ok(None) => {
                    // Never validated: schedule a fresh verdict.
                    verdict.needs_revalidation = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "email validation cache lookup failed");
                }
            }

            // 4. Format validation.
            if !is_valid_email_format(email) {
                verdict.valid = false;
                verdict.email_valid = Some(false);
                verdict.needs_revalidation = false;
                verdict.errors.push("Invalid email format".to_string());
            }
        }

        // 5. Phone canonicalization: a malformed phone is an error but does
        //    not block the submission by itself.
        if let Some(Value::String(raw_phone)) = raw.get("phone") {
            if !raw_phone.trim().is_empty() && canonicalize_phone(raw_phone).is_err() {
                verdict
                    .errors
                    .push("Invalid phone number format".to_string());
            }
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_core::{EmailValidationStatus, EventType};

    fn submission(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn validate(store: &Arc<Store>, raw: &Map<String, Value>) -> (Event, Verdict) {
        let validator = Validator::new(Arc::clone(store), ValidatorConfig::default());
        let event = Event::from_submission(EventType::Lead, raw);
        let verdict = validator.validate(&event, raw);
        (event, verdict)
    }

    // =========================================================================
    // Honeypot
    // =========================================================================

    #[test]
    fn test_honeypot_blocks_and_registers() {
        let store = Arc::new(Store::in_memory().unwrap());
        let raw = submission(&[
            ("email", json!("bot@spam.com")),
            ("zipcode", json!("90210")),
        ]);
        let (_, verdict) = validate(&store, &raw);

        assert!(!verdict.valid);
        assert!(verdict.is_bot);
        assert_eq!(verdict.bot_reason.as_deref(), Some("honeypot_triggered"));
        // Round-trip law: the identifier is now a known bot.
        assert!(store
            .is_known_bot(Some("bot@spam.com"), None, None)
            .unwrap());
    }

    #[test]
    fn test_empty_honeypot_field_is_not_a_trigger() {
        let store = Arc::new(Store::in_memory().unwrap());
        let raw = submission(&[("email", json!("a@b.com")), ("zipcode", json!("  "))]);
        let (_, verdict) = validate(&store, &raw);
        assert!(verdict.valid);
        assert!(!verdict.is_bot);
    }

    #[test]
    fn test_honeypot_short_circuits_other_checks() {
        let store = Arc::new(Store::in_memory().unwrap());
        // Bad email format AND honeypot: only the bot verdict is reported.
        let raw = submission(&[
            ("email", json!("not-an-email")),
            ("phonenumber", json!("123")),
        ]);
        let (_, verdict) = validate(&store, &raw);
        assert!(verdict.is_bot);
        assert!(verdict.errors.is_empty());
    }

    // =========================================================================
    // Known bot
    // =========================================================================

    #[test]
    fn test_known_bot_by_associated_identifier() {
        let store = Arc::new(Store::in_memory().unwrap());
        store
            .record_honeypot_bot(
                Some("bot@spam.com"),
                Some("18005550100"),
                Some("10.0.0.1"),
                &["zipcode".to_string()],
            )
            .unwrap();

        // A later clean-looking submission reusing the phone is condemned.
        let raw = submission(&[
            ("email", json!("fresh@new.com")),
            ("phone", json!("8005550100")),
        ]);
        let (_, verdict) = validate(&store, &raw);
        assert!(!verdict.valid);
        assert_eq!(verdict.bot_reason.as_deref(), Some("known_bot"));
        // No side effect for known-bot hits: the fresh email is not keyed.
        assert!(store
            .find_bot(switchboard_core::BotIdentifierType::Email, "fresh@new.com")
            .unwrap()
            .is_none());
    }

    // =========================================================================
    // Cached email validity
    // =========================================================================

    #[test]
    fn test_cached_valid_email_within_ttl() {
        let store = Arc::new(Store::in_memory().unwrap());
        store
            .record_email_validation(
                "good@b.com",
                EmailValidationStatus::Valid,
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .unwrap();

        let raw = submission(&[("email", json!("good@b.com"))]);
        let (_, verdict) = validate(&store, &raw);
        assert!(verdict.valid);
        assert_eq!(verdict.email_valid, Some(true));
        assert_eq!(verdict.email_validation_source, Some("cache"));
        assert!(!verdict.needs_revalidation);
    }

    #[test]
    fn test_cached_invalid_email_blocks() {
        let store = Arc::new(Store::in_memory().unwrap());
        store
            .record_email_validation(
                "bad@b.com",
                EmailValidationStatus::Invalid,
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .unwrap();

        let raw = submission(&[("email", json!("bad@b.com"))]);
        let (_, verdict) = validate(&store, &raw);
        assert!(!verdict.valid);
        assert_eq!(verdict.email_valid, Some(false));
        assert!(verdict
            .errors
            .iter()
            .any(|e| e == "Email address is invalid"));
    }

    #[test]
    fn test_unknown_email_needs_revalidation() {
        let store = Arc::new(Store::in_memory().unwrap());
        let raw = submission(&[("email", json!("new@example.com"))]);
        let (_, verdict) = validate(&store, &raw);
        assert!(verdict.valid);
        assert!(verdict.needs_revalidation);
        assert!(verdict.email_valid.is_none());
        assert!(verdict.email_validation_source.is_none());
    }

    #[test]
    fn test_catch_all_and_role_are_deliverable() {
        let store = Arc::new(Store::in_memory().unwrap());
        for (email, status) in [
            ("ca@b.com", EmailValidationStatus::CatchAll),
            ("role@b.com", EmailValidationStatus::Role),
        ] {
            store
                .record_email_validation(email, status, None, None, None, None, None, None)
                .unwrap();
            let raw = submission(&[("email", json!(email))]);
            let (_, verdict) = validate(&store, &raw);
            assert!(verdict.valid, "{email} should pass");
            assert_eq!(verdict.email_valid, Some(true));
        }
    }

    // =========================================================================
    // Format checks
    // =========================================================================

    #[test]
    fn test_bad_email_format_blocks() {
        let store = Arc::new(Store::in_memory().unwrap());
        let raw = submission(&[("email", json!("not-an-email"))]);
        let (_, verdict) = validate(&store, &raw);
        assert!(!verdict.valid);
        assert_eq!(verdict.email_valid, Some(false));
        assert!(!verdict.needs_revalidation, "no point validating garbage");
        assert!(verdict.errors.iter().any(|e| e == "Invalid email format"));
    }

    #[test]
    fn test_bad_phone_is_non_blocking() {
        let store = Arc::new(Store::in_memory().unwrap());
        let raw = submission(&[("email", json!("a@b.com")), ("phone", json!("12345"))]);
        let (event, verdict) = validate(&store, &raw);
        assert!(verdict.valid, "phone alone never blocks");
        assert!(event.phone.is_none());
        assert!(verdict
            .errors
            .iter()
            .any(|e| e == "Invalid phone number format"));
    }

    #[test]
    fn test_missing_email_passes_with_no_verdict() {
        let store = Arc::new(Store::in_memory().unwrap());
        let raw = submission(&[("phone", json!("8005550100"))]);
        let (_, verdict) = validate(&store, &raw);
        assert!(verdict.valid);
        assert!(verdict.email_valid.is_none());
        assert!(!verdict.needs_revalidation);
    }
}
