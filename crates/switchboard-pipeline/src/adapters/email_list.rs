//! Email list sync adapter: plain contact subscription, no special
//! behavior.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use switchboard_core::{Event, PlatformDefinition};

use super::{AdapterError, HttpSender, PlatformAdapter, SendOutcome};

pub struct EmailListAdapter {
    endpoint: Option<String>,
    api_key: Option<String>,
    list_id: Option<String>,
    http: HttpSender,
}

impl EmailListAdapter {
    pub fn new(
        platform: &PlatformDefinition,
        config: Map<String, Value>,
    ) -> Result<Self, AdapterError> {
        Ok(EmailListAdapter {
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

#[async_trait]
impl PlatformAdapter for EmailListAdapter {
    async fn send(&self, event: &Event) -> Result<SendOutcome, AdapterError> {
        if event.email.is_none() {
            return Ok(SendOutcome::failure("No email to sync", None));
        }
        let mut body = Value::Object(self.map_fields(event));
        if let Some(api_key) = &self.api_key {
            body["api_key"] = json!(api_key);
        }
        let url = format!("{}/lists/{}/members", self.endpoint(), self.list_id.as_deref().unwrap_or("default"));
        let (status, response_body) = self.http.post_json(&url, &body).await?;
        Ok(SendOutcome::ok(status, response_body))
    }

    fn map_fields(&self, event: &Event) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("email".into(), json!(event.email));
        fields.insert("first_name".into(), json!(event.first_name));
        fields.insert("last_name".into(), json!(event.last_name));
        fields.insert("source".into(), json!(event.acq_source));
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
