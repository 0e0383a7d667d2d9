//! SMS opt-in adapter.
//!
//! Hard prerequisite: a canonical 11-digit phone. The processor's skip
//! check normally filters phoneless events before this adapter runs; the
//! precondition here is the platform contract's own line of defense and
//! reports a definitive failure, not a transport error.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use switchboard_core::{Event, PlatformDefinition};

use super::{AdapterError, HttpSender, PlatformAdapter, SendOutcome};

pub struct SmsAdapter {
    endpoint: Option<String>,
    api_key: Option<String>,
    list_id: Option<String>,
    http: HttpSender,
}

impl SmsAdapter {
    pub fn new(
        platform: &PlatformDefinition,
        config: Map<String, Value>,
    ) -> Result<Self, AdapterError> {
        Ok(SmsAdapter {
            endpoint: PlatformDefinition::config_str(&config, "endpoint"),
            api_key: PlatformDefinition::config_str(&config, "api_key"),
            list_id: PlatformDefinition::config_str(&config, "list_id"),
            http: HttpSender::new(
                platform.timeout_secs,
                platform.max_retries,
                platform.retry_delay_secs,
            )?,
        })
    }

    fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or_default()
    }
}

/// Whether a phone satisfies the platform's 11-digit requirement.
fn phone_is_usable(phone: Option<&str>) -> bool {
    phone.is_some_and(|p| p.chars().filter(|c| c.is_ascii_digit()).count() >= 11)
}

#[async_trait]
impl PlatformAdapter for SmsAdapter {
    async fn send(&self, event: &Event) -> Result<SendOutcome, AdapterError> {
        if !phone_is_usable(event.phone.as_deref()) {
            return Ok(SendOutcome::failure(
                "Invalid or missing phone number",
                None,
            ));
        }

        let mut body = Value::Object(self.map_fields(event));
        if let Some(api_key) = &self.api_key {
            body["api_key"] = json!(api_key);
        }
        let url = format!("{}/subscribers", self.endpoint());
        let (status, response_body) = self.http.post_json(&url, &body).await?;
        Ok(SendOutcome::ok(status, response_body))
    }

    fn map_fields(&self, event: &Event) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("phone".into(), json!(event.phone));
        fields.insert("first_name".into(), json!(event.first_name));
        fields.insert("email".into(), json!(event.email));
        if let Some(list_id) = &self.list_id {
            fields.insert("list_id".into(), json!(list_id));
        }
        fields
    }

    fn validate_config(&self) -> Result<(), AdapterError> {
        if self.endpoint.is_none() {
            return Err(AdapterError::Config("missing endpoint".to_string()));
        }
        if self.api_key.is_none() {
            return Err(AdapterError::Config("missing api_key".to_string()));
        }
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        self.http.probe(self.endpoint()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_platform;
    use switchboard_core::{EventType, PlatformType};

    fn adapter() -> SmsAdapter {
        let config = json!({"endpoint": "https://sms.example.com", "api_key": "k", "list_id": "7"});
        SmsAdapter::new(
            &test_platform("smsoptin", PlatformType::Sms, config.clone()),
            config.as_object().cloned().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_phone_precondition() {
        assert!(phone_is_usable(Some("18005550100")));
        assert!(!phone_is_usable(Some("8005550100")), "10 digits is short");
        assert!(!phone_is_usable(Some("")));
        assert!(!phone_is_usable(None));
    }

    #[tokio::test]
    async fn test_send_without_phone_fails_definitively() {
        let a = adapter();
        let event = Event::from_submission(EventType::Lead, &Map::new());
        let outcome = a.send(&event).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Invalid or missing phone number")
        );
    }

    #[test]
    fn test_map_fields_includes_list_id() {
        let a = adapter();
        let raw: Map<String, Value> = [("phone".to_string(), json!("8005550100"))]
            .into_iter()
            .collect();
        let event = Event::from_submission(EventType::Lead, &raw);
        let fields = a.map_fields(&event);
        assert_eq!(fields.get("phone"), Some(&json!("18005550100")));
        assert_eq!(fields.get("list_id"), Some(&json!("7")));
    }

    #[test]
    fn test_config_validation() {
        let bare = SmsAdapter::new(
            &test_platform("smsoptin", PlatformType::Sms, json!({})),
            Map::new(),
        )
        .unwrap();
        assert!(bare.validate_config().is_err());
        assert!(adapter().validate_config().is_ok());
    }
}
