//! Per-platform delivery adapters.
//!
//! Every downstream platform is driven through the [`PlatformAdapter`]
//! trait: map an event to the platform's fields, send it, interpret the
//! response into a [`SendOutcome`]. Adapters never mutate the event; all
//! interpretation beyond a small typed set (revenue, validation verdict,
//! contact id) stays in the raw response body.
//!
//! Transport problems surface as [`AdapterError`] so the processor can make
//! retry decisions; a definitive platform answer (including "this contact
//! is garbage") is a `SendOutcome` with `success = false`.
//!
//! Construction goes through the [`AdapterFactory`] registry map, which
//! flattens each platform's nested `api_config` before the builder runs and
//! validates the configuration at build time.

mod analytics;
mod crm;
mod email_list;
mod http;
mod monetization;
mod sms;
mod validation;

pub use analytics::AnalyticsAdapter;
pub use crm::CrmAdapter;
pub use email_list::EmailListAdapter;
pub use http::HttpSender;
pub use monetization::MonetizationAdapter;
pub use sms::SmsAdapter;
pub use validation::{parse_validation_response, ValidationAdapter};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use switchboard_core::{Event, PlatformDefinition};
use thiserror::Error;

use crate::error::{Error, Result};

/// Transport- and configuration-level adapter failures.
///
/// Retryability drives the processor's retry-vs-fail decision: timeouts,
/// connection drops, 5xx, and rate limits are worth another attempt; auth
/// rejections, other 4xx, and bad configuration are not.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("authentication rejected")]
    Auth,

    #[error("rate limited")]
    RateLimited,

    /// Unusable configuration; fatal for the platform until reconfigured.
    #[error("invalid adapter configuration: {0}")]
    Config(String),
}

impl AdapterError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Timeout | AdapterError::Connection(_) | AdapterError::RateLimited => {
                true
            }
            AdapterError::Http { status, .. } => *status >= 500,
            AdapterError::Auth | AdapterError::Config(_) => false,
        }
    }

    /// The HTTP status to record on the job, when one exists.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AdapterError::Http { status, .. } => Some(*status),
            AdapterError::Auth => Some(401),
            AdapterError::RateLimited => Some(429),
            _ => None,
        }
    }
}

/// Email verdict details returned by a validation platform.
#[derive(Debug, Clone, Default)]
pub struct ValidationData {
    pub status: String,
    pub substatus: Option<String>,
    pub active_in_days: Option<i64>,
    pub free_email: Option<bool>,
    pub mx_found: Option<bool>,
}

/// The interpreted result of one logical send.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    pub success: bool,
    pub response_code: Option<u16>,
    pub platform_response: Option<String>,
    pub error: Option<String>,
    /// Revenue attributed by a monetization platform.
    pub revenue: Option<f64>,
    /// Present on validation platforms only.
    pub validation_data: Option<ValidationData>,
    /// Present on CRM platforms: the upstream contact identifier.
    pub contact_id: Option<String>,
}

impl SendOutcome {
    pub fn ok(response_code: u16, body: impl Into<String>) -> Self {
        SendOutcome {
            success: true,
            response_code: Some(response_code),
            platform_response: Some(body.into()),
            ..SendOutcome::default()
        }
    }

    pub fn failure(error: impl Into<String>, response_code: Option<u16>) -> Self {
        SendOutcome {
            success: false,
            response_code,
            error: Some(error.into()),
            ..SendOutcome::default()
        }
    }
}

/// The per-platform delivery contract.
///
/// Adapters are pure with respect to the event: `send` reads, never writes.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Deliver one event. `Err` means transport/config trouble; `Ok` with
    /// `success = false` is the platform's own rejection.
    async fn send(&self, event: &Event) -> std::result::Result<SendOutcome, AdapterError>;

    /// The platform-shaped field map for this event (logging/audit only).
    fn map_fields(&self, event: &Event) -> Map<String, Value>;

    /// Check the configuration is usable. Run at construction.
    fn validate_config(&self) -> std::result::Result<(), AdapterError>;

    /// Cheap connectivity probe.
    async fn test_connection(&self) -> bool;
}

/// Builder signature: `(platform, merged flat config) → adapter`.
pub type AdapterBuilder = Arc<
    dyn Fn(
            &PlatformDefinition,
            Map<String, Value>,
        ) -> std::result::Result<Box<dyn PlatformAdapter>, AdapterError>
        + Send
        + Sync,
>;

/// Registry map from platform code (or type) to adapter constructor.
pub struct AdapterFactory {
    builders: HashMap<String, AdapterBuilder>,
}

impl AdapterFactory {
    /// Factory with the built-in adapters registered under both their
    /// canonical codes and their platform-type names, so an operator can
    /// name a platform freely as long as its type is right.
    pub fn with_defaults() -> Self {
        let mut factory = AdapterFactory {
            builders: HashMap::new(),
        };

        let validation: AdapterBuilder =
            Arc::new(|p, c| Ok(Box::new(ValidationAdapter::new(p, c)?) as Box<dyn PlatformAdapter>));
        let crm: AdapterBuilder =
            Arc::new(|p, c| Ok(Box::new(CrmAdapter::new(p, c)?) as Box<dyn PlatformAdapter>));
        let analytics: AdapterBuilder =
            Arc::new(|p, c| Ok(Box::new(AnalyticsAdapter::new(p, c)?) as Box<dyn PlatformAdapter>));
        let sms: AdapterBuilder =
            Arc::new(|p, c| Ok(Box::new(SmsAdapter::new(p, c)?) as Box<dyn PlatformAdapter>));
        let monetization: AdapterBuilder = Arc::new(|p, c| {
            Ok(Box::new(MonetizationAdapter::new(p, c)?) as Box<dyn PlatformAdapter>)
        });
        let email: AdapterBuilder =
            Arc::new(|p, c| Ok(Box::new(EmailListAdapter::new(p, c)?) as Box<dyn PlatformAdapter>));

        factory.register("zerobounce", Arc::clone(&validation));
        factory.register("validation", validation);
        factory.register("leadcrm", Arc::clone(&crm));
        factory.register("crm", crm);
        factory.register("segmentio", Arc::clone(&analytics));
        factory.register("analytics", analytics);
        factory.register("smsoptin", Arc::clone(&sms));
        factory.register("sms", sms);
        factory.register("coregnet", Arc::clone(&monetization));
        factory.register("monetization", monetization);
        factory.register("mailsync", Arc::clone(&email));
        factory.register("email", email);

        factory
    }

    /// Register (or override) a builder for a code.
    pub fn register(&mut self, code: impl Into<String>, builder: AdapterBuilder) {
        self.builders.insert(code.into(), builder);
    }

    /// Build and config-validate an adapter for a platform.
    ///
    /// Resolution order: exact platform code, then platform type. The
    /// nested `api_config` is flattened before the builder sees it.
    pub fn build(&self, platform: &PlatformDefinition) -> Result<Box<dyn PlatformAdapter>> {
        let builder = self
            .builders
            .get(&platform.platform_code)
            .or_else(|| self.builders.get(platform.platform_type.as_str()))
            .ok_or_else(|| Error::UnknownPlatformCode(platform.platform_code.clone()))?;

        let merged = platform.merged_config();
        let adapter = builder(platform, merged).map_err(|e| Error::AdapterConfig {
            platform: platform.platform_code.clone(),
            reason: e.to_string(),
        })?;
        adapter.validate_config().map_err(|e| Error::AdapterConfig {
            platform: platform.platform_code.clone(),
            reason: e.to_string(),
        })?;
        Ok(adapter)
    }
}

#[cfg(test)]
pub(crate) fn test_platform(
    code: &str,
    platform_type: switchboard_core::PlatformType,
    config: Value,
) -> PlatformDefinition {
    PlatformDefinition {
        id: 1,
        platform_code: code.to_string(),
        display_name: code.to_string(),
        platform_type,
        is_active: true,
        api_config: config.as_object().cloned().unwrap_or_default(),
        timeout_secs: 5,
        max_retries: 0,
        retry_delay_secs: 0,
        requires_valid_email: true,
        priority: 10,
    }
}
