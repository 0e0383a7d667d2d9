//! Email validation adapter (ZeroBounce-shaped API).
//!
//! The send returns a [`ValidationData`] verdict instead of a plain
//! delivered/undelivered flag; the processor consumes it on the
//! validation-first path, where an invalid verdict cancels the event's
//! pending siblings.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use switchboard_core::{Event, PlatformDefinition};

use super::{AdapterError, HttpSender, PlatformAdapter, SendOutcome, ValidationData};

const DEFAULT_ENDPOINT: &str = "https://api.zerobounce.net/v2/validate";

pub struct ValidationAdapter {
    endpoint: String,
    api_key: Option<String>,
    http: HttpSender,
}

impl ValidationAdapter {
    pub fn new(
        platform: &PlatformDefinition,
        config: Map<String, Value>,
    ) -> Result<Self, AdapterError> {
        let endpoint = PlatformDefinition::config_str(&config, "endpoint")
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let api_key = PlatformDefinition::config_str(&config, "api_key");
        let http = HttpSender::new(
            platform.timeout_secs,
            platform.max_retries,
            platform.retry_delay_secs,
        )?;
        Ok(ValidationAdapter {
            endpoint,
            api_key,
            http,
        })
    }
}

/// Parse a validation API response body into a verdict.
///
/// Unknown or malformed bodies degrade to an `unknown` status rather than
/// erroring: the canonical mapping treats anything unrecognized as unknown.
pub fn parse_validation_response(body: &str) -> ValidationData {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    ValidationData {
        status: parsed
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        substatus: parsed
            .get("sub_status")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from),
        active_in_days: parsed
            .get("active_in_days")
            .and_then(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            }),
        free_email: parsed.get("free_email").and_then(Value::as_bool),
        mx_found: parsed.get("mx_found").and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => Some(s == "true"),
            _ => None,
        }),
    }
}

#[async_trait]
impl PlatformAdapter for ValidationAdapter {
    async fn send(&self, event: &Event) -> Result<SendOutcome, AdapterError> {
        let Some(email) = event.email.as_deref().filter(|e| !e.is_empty()) else {
            return Ok(SendOutcome::failure("No email to validate", None));
        };

        let mut query = vec![("email".to_string(), email.to_string())];
        if let Some(api_key) = &self.api_key {
            query.push(("api_key".to_string(), api_key.clone()));
        }
        if let Some(ip) = event.ip_address.as_deref() {
            query.push(("ip_address".to_string(), ip.to_string()));
        }

        let (status, body) = self.http.get(&self.endpoint, &query).await?;
        let verdict = parse_validation_response(&body);

        let mut outcome = SendOutcome::ok(status, body);
        outcome.validation_data = Some(verdict);
        Ok(outcome)
    }

    fn map_fields(&self, event: &Event) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("email".into(), json!(event.email));
        fields.insert("ip_address".into(), json!(event.ip_address));
        fields
    }

    fn validate_config(&self) -> Result<(), AdapterError> {
        if self.api_key.is_none() {
            return Err(AdapterError::Config("missing api_key".to_string()));
        }
        if !self.endpoint.starts_with("http") {
            return Err(AdapterError::Config(format!(
                "endpoint '{}' is not a URL",
                self.endpoint
            )));
        }
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        self.http.probe(&self.endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_platform;
    use switchboard_core::PlatformType;

    fn adapter(config: Value) -> ValidationAdapter {
        ValidationAdapter::new(
            &test_platform("zerobounce", PlatformType::Validation, config.clone()),
            config.as_object().cloned().unwrap_or_default(),
        )
        .unwrap()
    }

    #[test]
    fn test_config_requires_api_key() {
        assert!(adapter(json!({})).validate_config().is_err());
        assert!(adapter(json!({"api_key": "k"})).validate_config().is_ok());
    }

    #[test]
    fn test_default_endpoint() {
        let a = adapter(json!({"api_key": "k"}));
        assert_eq!(a.endpoint, DEFAULT_ENDPOINT);
        let a = adapter(json!({"api_key": "k", "endpoint": "https://mock.test/v2"}));
        assert_eq!(a.endpoint, "https://mock.test/v2");
    }

    #[test]
    fn test_parse_full_response() {
        let verdict = parse_validation_response(
            r#"{"status": "valid", "sub_status": "", "active_in_days": "180",
                "free_email": true, "mx_found": "true"}"#,
        );
        assert_eq!(verdict.status, "valid");
        assert!(verdict.substatus.is_none(), "empty substatus dropped");
        assert_eq!(verdict.active_in_days, Some(180));
        assert_eq!(verdict.free_email, Some(true));
        assert_eq!(verdict.mx_found, Some(true));
    }

    #[test]
    fn test_parse_invalid_with_substatus() {
        let verdict = parse_validation_response(
            r#"{"status": "invalid", "sub_status": "mailbox_not_found"}"#,
        );
        assert_eq!(verdict.status, "invalid");
        assert_eq!(verdict.substatus.as_deref(), Some("mailbox_not_found"));
        assert!(verdict.active_in_days.is_none());
    }

    #[test]
    fn test_parse_garbage_degrades_to_unknown() {
        let verdict = parse_validation_response("not json at all");
        assert_eq!(verdict.status, "unknown");
    }

    #[tokio::test]
    async fn test_send_without_email_is_definitive_failure() {
        let a = adapter(json!({"api_key": "k"}));
        let event = Event::from_submission(
            switchboard_core::EventType::Lead,
            &serde_json::Map::new(),
        );
        let outcome = a.send(&event).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("No email to validate"));
    }

    #[test]
    fn test_map_fields() {
        let a = adapter(json!({"api_key": "k"}));
        let raw: Map<String, Value> = [
            ("email".to_string(), json!("a@b.com")),
            ("ip".to_string(), json!("10.0.0.1")),
        ]
        .into_iter()
        .collect();
        let event = Event::from_submission(switchboard_core::EventType::Lead, &raw);
        let fields = a.map_fields(&event);
        assert_eq!(fields.get("email"), Some(&json!("a@b.com")));
        assert_eq!(fields.get("ip_address"), Some(&json!("10.0.0.1")));
    }
}
