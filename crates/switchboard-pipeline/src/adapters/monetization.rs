//! Monetization (co-registration) adapter.
//!
//! The co-reg network answers with a plain-text body; the literal string
//! `Success` means the lead was accepted and earns the configured
//! per-lead revenue (default 2.00). Anything else delivers with zero
//! revenue.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use switchboard_core::{Event, PlatformDefinition};

use super::{AdapterError, HttpSender, PlatformAdapter, SendOutcome};

const DEFAULT_REVENUE_PER_LEAD: f64 = 2.00;

pub struct MonetizationAdapter {
    endpoint: Option<String>,
    publisher_id: Option<String>,
    revenue_per_lead: f64,
    http: HttpSender,
}

impl MonetizationAdapter {
    pub fn new(
        platform: &PlatformDefinition,
        config: Map<String, Value>,
    ) -> Result<Self, AdapterError> {
        Ok(MonetizationAdapter {
            endpoint: PlatformDefinition::config_str(&config, "endpoint"),
            publisher_id: PlatformDefinition::config_str(&config, "publisher_id"),
            revenue_per_lead: PlatformDefinition::config_f64(&config, "revenue_per_lead")
                .unwrap_or(DEFAULT_REVENUE_PER_LEAD),
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

/// Interpret the co-reg response body into an outcome with revenue.
pub(crate) fn interpret_coreg_response(
    status: u16,
    body: String,
    revenue_per_lead: f64,
) -> SendOutcome {
    let accepted = body.contains("Success");
    let mut outcome = SendOutcome::ok(status, body);
    outcome.revenue = Some(if accepted { revenue_per_lead } else { 0.0 });
    outcome
}

#[async_trait]
impl PlatformAdapter for MonetizationAdapter {
    async fn send(&self, event: &Event) -> Result<SendOutcome, AdapterError> {
        let mut form: Vec<(String, String)> = Vec::new();
        for (key, value) in self.map_fields(event) {
            if let Value::String(s) = value {
                form.push((key, s));
            }
        }
        let (status, body) = self.http.post_form(self.endpoint(), &form).await?;
        Ok(interpret_coreg_response(status, body, self.revenue_per_lead))
    }

    fn map_fields(&self, event: &Event) -> Map<String, Value> {
        let mut fields = Map::new();
        let put = |fields: &mut Map<String, Value>, key: &str, value: &Option<String>| {
            if let Some(v) = value {
                fields.insert(key.to_string(), json!(v));
            }
        };
        put(&mut fields, "email", &event.email);
        put(&mut fields, "phone", &event.phone);
        put(&mut fields, "first_name", &event.first_name);
        put(&mut fields, "last_name", &event.last_name);
        put(&mut fields, "ip", &event.ip_address);
        put(&mut fields, "source", &event.cur_source);
        if let Some(publisher_id) = &self.publisher_id {
            fields.insert("publisher_id".into(), json!(publisher_id));
        }
        fields
    }

    fn validate_config(&self) -> Result<(), AdapterError> {
        if self.endpoint.is_none() {
            return Err(AdapterError::Config("missing endpoint".to_string()));
        }
        if self.publisher_id.is_none() {
            return Err(AdapterError::Config("missing publisher_id".to_string()));
        }
        if self.revenue_per_lead < 0.0 {
            return Err(AdapterError::Config(
                "revenue_per_lead must be non-negative".to_string(),
            ));
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

    fn adapter(config: Value) -> MonetizationAdapter {
        MonetizationAdapter::new(
            &test_platform("coregnet", PlatformType::Monetization, config.clone()),
            config.as_object().cloned().unwrap_or_default(),
        )
        .unwrap()
    }

    #[test]
    fn test_success_string_earns_revenue() {
        let outcome = interpret_coreg_response(200, "Success: lead accepted".into(), 2.0);
        assert!(outcome.success);
        assert_eq!(outcome.revenue, Some(2.0));
    }

    #[test]
    fn test_non_success_body_zero_revenue() {
        let outcome = interpret_coreg_response(200, "Duplicate lead".into(), 2.0);
        assert!(outcome.success, "delivered, just unpaid");
        assert_eq!(outcome.revenue, Some(0.0));
    }

    #[test]
    fn test_default_revenue_per_lead() {
        let a = adapter(json!({"endpoint": "https://coreg.example", "publisher_id": "p9"}));
        assert_eq!(a.revenue_per_lead, 2.00);
        let a = adapter(json!({
            "endpoint": "https://coreg.example",
            "publisher_id": "p9",
            "revenue_per_lead": "3.25"
        }));
        assert_eq!(a.revenue_per_lead, 3.25);
    }

    #[test]
    fn test_config_validation() {
        assert!(adapter(json!({})).validate_config().is_err());
        assert!(adapter(json!({"endpoint": "https://c.example"}))
            .validate_config()
            .is_err());
        assert!(
            adapter(json!({"endpoint": "https://c.example", "publisher_id": "p9"}))
                .validate_config()
                .is_ok()
        );
    }

    #[test]
    fn test_map_fields_skips_absent() {
        let a = adapter(json!({"endpoint": "https://c.example", "publisher_id": "p9"}));
        let raw: Map<String, Value> = [("email".to_string(), json!("a@b.com"))]
            .into_iter()
            .collect();
        let event = Event::from_submission(EventType::Lead, &raw);
        let fields = a.map_fields(&event);
        assert_eq!(fields.get("email"), Some(&json!("a@b.com")));
        assert!(!fields.contains_key("phone"));
        assert_eq!(fields.get("publisher_id"), Some(&json!("p9")));
    }
}
