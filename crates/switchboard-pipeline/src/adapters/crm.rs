//! CRM contact sync adapter.
//!
//! Upserts the event's contact and returns the upstream contact id. When
//! the platform reports an existing contact was updated rather than
//! created, a second call stamps the contact's last-submission time; both
//! calls are reported as one logical send, and a failure of the stamp call
//! never fails the send.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use switchboard_core::{Event, PlatformDefinition};

use super::{AdapterError, HttpSender, PlatformAdapter, SendOutcome};

pub struct CrmAdapter {
    endpoint: Option<String>,
    api_key: Option<String>,
    http: HttpSender,
}

impl CrmAdapter {
    pub fn new(
        platform: &PlatformDefinition,
        config: Map<String, Value>,
    ) -> Result<Self, AdapterError> {
        Ok(CrmAdapter {
            endpoint: PlatformDefinition::config_str(&config, "endpoint"),
            api_key: PlatformDefinition::config_str(&config, "api_key"),
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

/// Pull the contact id out of a CRM response, tolerating either key.
fn extract_contact_id(parsed: &Value) -> Option<String> {
    parsed
        .get("contact_id")
        .or_else(|| parsed.get("id"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[async_trait]
impl PlatformAdapter for CrmAdapter {
    async fn send(&self, event: &Event) -> Result<SendOutcome, AdapterError> {
        let mut body = Value::Object(self.map_fields(event));
        if let Some(api_key) = &self.api_key {
            body["api_key"] = json!(api_key);
        }

        let url = format!("{}/contacts", self.endpoint());
        let (status, response_body) = self.http.post_json(&url, &body).await?;

        let parsed: Value = serde_json::from_str(&response_body).unwrap_or(Value::Null);
        let contact_id = extract_contact_id(&parsed);
        let existing = parsed
            .get("existing")
            .or_else(|| parsed.get("updated"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        // Existing contact: stamp the last-submission time in a second
        // call. Best-effort; the logical send already succeeded.
        if existing {
            if let Some(id) = &contact_id {
                let touch_url = format!("{}/contacts/{}/touch", self.endpoint(), id);
                let stamp = json!({"last_submission_at": chrono::Utc::now().timestamp()});
                if let Err(e) = self.http.post_json(&touch_url, &stamp).await {
                    tracing::warn!(contact_id = %id, error = %e, "contact touch call failed");
                }
            }
        }

        let mut outcome = SendOutcome::ok(status, response_body);
        outcome.contact_id = contact_id;
        Ok(outcome)
    }

    fn map_fields(&self, event: &Event) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("email".into(), json!(event.email));
        fields.insert("phone".into(), json!(event.phone));
        fields.insert("first_name".into(), json!(event.first_name));
        fields.insert("last_name".into(), json!(event.last_name));
        fields.insert("source".into(), json!(event.acq_source));
        fields.insert("campaign".into(), json!(event.acq_campaign));
        fields.insert("form_title".into(), json!(event.acq_form_title));
        fields
    }

    fn validate_config(&self) -> Result<(), AdapterError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| AdapterError::Config("missing endpoint".to_string()))?;
        if !endpoint.starts_with("http") {
            return Err(AdapterError::Config(format!(
                "endpoint '{endpoint}' is not a URL"
            )));
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
