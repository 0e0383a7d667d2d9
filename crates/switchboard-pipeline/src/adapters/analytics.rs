//! Analytics adapter: identify + event sub-calls.
//!
//! One logical send fires up to four sub-events. The identify and the
//! primary event are mandatory; the send succeeds iff both do. The SMS
//! opt-in event (when the contact has a phone) and the co-branding event
//! (when the submission carried a co-brand marker) are best-effort.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use switchboard_core::{Event, PlatformDefinition};

use super::{AdapterError, HttpSender, PlatformAdapter, SendOutcome};

pub struct AnalyticsAdapter {
    endpoint: Option<String>,
    write_key: Option<String>,
    http: HttpSender,
}

impl AnalyticsAdapter {
    pub fn new(
        platform: &PlatformDefinition,
        config: Map<String, Value>,
    ) -> Result<Self, AdapterError> {
        Ok(AnalyticsAdapter {
            endpoint: PlatformDefinition::config_str(&config, "endpoint"),
            write_key: PlatformDefinition::config_str(&config, "write_key")
                .or_else(|| PlatformDefinition::config_str(&config, "api_key")),
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

    /// The stable user key for identify/track calls: fingerprint when we
    /// have an email, the external event UUID otherwise.
    fn user_id(event: &Event) -> String {
        event
            .email_md5
            .clone()
            .unwrap_or_else(|| event.event_id.clone())
    }

    async fn sub_event(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<(u16, String), AdapterError> {
        let url = format!("{}/{}", self.endpoint(), path);
        self.http.post_json(&url, body).await
    }
}

#[async_trait]
impl PlatformAdapter for AnalyticsAdapter {
    async fn send(&self, event: &Event) -> Result<SendOutcome, AdapterError> {
        let user_id = Self::user_id(event);
        let write_key = self.write_key.clone().unwrap_or_default();

        // Mandatory: identify.
        let identify = json!({
            "write_key": write_key,
            "user_id": user_id,
            "traits": Value::Object(self.map_fields(event)),
        });
        self.sub_event("identify", &identify).await?;

        // Mandatory: the primary event.
        let track = json!({
            "write_key": write_key,
            "user_id": user_id,
            "event": event.event_type.as_str(),
            "properties": {
                "source": event.cur_source,
                "campaign": event.cur_campaign,
                "amount": event.purchase_amount,
            },
        });
        let (status, body) = self.sub_event("track", &track).await?;

        // Best-effort: SMS opt-in marker.
        if event.phone.is_some() {
            let sms = json!({
                "write_key": write_key,
                "user_id": user_id,
                "event": "sms_opt_in",
            });
            if let Err(e) = self.sub_event("track", &sms).await {
                tracing::debug!(error = %e, "optional sms sub-event failed");
            }
        }

        // Best-effort: co-branding marker.
        if let Some(partner) = event.event_data.get("co_brand") {
            let cobrand = json!({
                "write_key": write_key,
                "user_id": user_id,
                "event": "co_brand_view",
                "properties": {"partner": partner},
            });
            if let Err(e) = self.sub_event("track", &cobrand).await {
                tracing::debug!(error = %e, "optional co-brand sub-event failed");
            }
        }

        Ok(SendOutcome::ok(status, body))
    }

    fn map_fields(&self, event: &Event) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("email".into(), json!(event.email));
        fields.insert("phone".into(), json!(event.phone));
        fields.insert("first_name".into(), json!(event.first_name));
        fields.insert("last_name".into(), json!(event.last_name));
        fields.insert("ga_client_id".into(), json!(event.ga_client_id));
        fields.insert("gclid".into(), json!(event.gclid));
        fields
    }

    fn validate_config(&self) -> Result<(), AdapterError> {
        if self.endpoint.is_none() {
            return Err(AdapterError::Config("missing endpoint".to_string()));
        }
        if self.write_key.is_none() {
            return Err(AdapterError::Config("missing write_key".to_string()));
        }
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        self.http.probe(self.endpoint()).await
    }
}
