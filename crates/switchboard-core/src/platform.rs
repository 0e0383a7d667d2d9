//! Downstream platform definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// The capability class of a downstream platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlatformType {
    Crm,
    Analytics,
    Sms,
    Validation,
    Monetization,
    Email,
}

impl PlatformType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformType::Crm => "crm",
            PlatformType::Analytics => "analytics",
            PlatformType::Sms => "sms",
            PlatformType::Validation => "validation",
            PlatformType::Monetization => "monetization",
            PlatformType::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "crm" => Ok(PlatformType::Crm),
            "analytics" => Ok(PlatformType::Analytics),
            "sms" => Ok(PlatformType::Sms),
            "validation" => Ok(PlatformType::Validation),
            "monetization" => Ok(PlatformType::Monetization),
            "email" => Ok(PlatformType::Email),
            other => Err(Error::UnknownPlatformType(other.to_string())),
        }
    }
}

/// A configured downstream platform.
///
/// Immutable during a worker's lifetime; the router reloads the full set on
/// demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformDefinition {
    pub id: i64,
    /// Unique code, e.g. `zerobounce`, used as the adapter registry key.
    pub platform_code: String,
    pub display_name: String,
    pub platform_type: PlatformType,
    pub is_active: bool,
    /// Opaque configuration map. May contain a nested `api_config` object
    /// which [`merged_config`](Self::merged_config) flattens.
    pub api_config: Map<String, Value>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Base delay for the adapter-level HTTP retry wrapper, in seconds.
    pub retry_delay_secs: u64,
    /// Withhold delivery when the event's email verdict is invalid.
    pub requires_valid_email: bool,
    /// Listing order for operator surfaces; lower sorts first. Fan-out
    /// ordering comes from the routing rules, not from here.
    pub priority: i64,
}

impl PlatformDefinition {
    /// Flatten a nested `api_config` object into the top-level map.
    ///
    /// Stored configs sometimes wrap adapter parameters in an inner
    /// `api_config` key; adapters always see the merged flat map, decoded
    /// exactly once at load. Top-level keys win on collision.
    pub fn merged_config(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        if let Some(Value::Object(nested)) = self.api_config.get("api_config") {
            for (k, v) in nested {
                merged.insert(k.clone(), v.clone());
            }
        }
        for (k, v) in &self.api_config {
            if k != "api_config" {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Read a string parameter from the merged config.
    pub fn config_str(config: &Map<String, Value>, key: &str) -> Option<String> {
        match config.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    /// Read a numeric parameter from the merged config.
    pub fn config_f64(config: &Map<String, Value>, key: &str) -> Option<f64> {
        match config.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn platform_with_config(config: Value) -> PlatformDefinition {
        PlatformDefinition {
            id: 1,
            platform_code: "testcrm".to_string(),
            display_name: "Test CRM".to_string(),
            platform_type: PlatformType::Crm,
            is_active: true,
            api_config: config.as_object().cloned().unwrap_or_default(),
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 2,
            requires_valid_email: true,
            priority: 10,
        }
    }

    #[test]
    fn test_merged_config_flattens_nested() {
        let platform = platform_with_config(json!({
            "endpoint": "https://crm.example.com",
            "api_config": {"api_key": "secret", "list_id": "42"}
        }));
        let merged = platform.merged_config();
        assert_eq!(merged.get("endpoint"), Some(&json!("https://crm.example.com")));
        assert_eq!(merged.get("api_key"), Some(&json!("secret")));
        assert_eq!(merged.get("list_id"), Some(&json!("42")));
        assert!(!merged.contains_key("api_config"));
    }

    #[test]
    fn test_merged_config_top_level_wins() {
        let platform = platform_with_config(json!({
            "api_key": "outer",
            "api_config": {"api_key": "inner"}
        }));
        let merged = platform.merged_config();
        assert_eq!(merged.get("api_key"), Some(&json!("outer")));
    }

    #[test]
    fn test_merged_config_without_nesting() {
        let platform = platform_with_config(json!({"api_key": "k"}));
        let merged = platform.merged_config();
        assert_eq!(merged.get("api_key"), Some(&json!("k")));
    }

    #[test]
    fn test_config_accessors() {
        let platform = platform_with_config(json!({
            "endpoint": " https://x.example ",
            "revenue_per_lead": "2.50",
            "count": 7
        }));
        let merged = platform.merged_config();
        assert_eq!(
            PlatformDefinition::config_str(&merged, "endpoint").as_deref(),
            Some("https://x.example")
        );
        assert_eq!(
            PlatformDefinition::config_f64(&merged, "revenue_per_lead"),
            Some(2.5)
        );
        assert_eq!(PlatformDefinition::config_f64(&merged, "count"), Some(7.0));
        assert!(PlatformDefinition::config_str(&merged, "missing").is_none());
    }

    #[test]
    fn test_platform_type_round_trip() {
        for ty in [
            PlatformType::Crm,
            PlatformType::Analytics,
            PlatformType::Sms,
            PlatformType::Validation,
            PlatformType::Monetization,
            PlatformType::Email,
        ] {
            assert_eq!(PlatformType::parse(ty.as_str()).unwrap(), ty);
        }
        assert!(PlatformType::parse("fax").is_err());
    }
}
