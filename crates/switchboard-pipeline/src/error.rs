//! Error types for the Switchboard pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while persisting or executing pipeline work.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite storage error.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Domain-model error from the core crate.
    #[error(transparent)]
    Core(#[from] switchboard_core::Error),

    /// JSON (de)serialization error for a persisted column.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (database directory creation and the like).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A job referenced an event that no longer exists. Fatal for the job.
    #[error("job {job_id} references missing event {event_id}")]
    EventNotFound {
        job_id: i64,
        event_id: i64,
    },

    /// A job referenced a platform that is gone or inactive. Fatal for the job.
    #[error("job {job_id} references missing platform {platform_id}")]
    PlatformNotFound {
        job_id: i64,
        platform_id: i64,
    },

    /// No adapter is registered for a platform code.
    #[error("no adapter registered for platform code '{0}'")]
    UnknownPlatformCode(String),

    /// A platform's configuration is unusable until reconfigured.
    #[error("invalid configuration for platform '{platform}': {reason}")]
    AdapterConfig {
        platform: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_not_found_display() {
        let err = Error::EventNotFound {
            job_id: 5,
            event_id: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("job 5"));
        assert!(msg.contains("event 42"));
    }

    #[test]
    fn test_adapter_config_display() {
        let err = Error::AdapterConfig {
            platform: "zerobounce".to_string(),
            reason: "missing api_key".to_string(),
        };
        assert!(err.to_string().contains("zerobounce"));
        assert!(err.to_string().contains("missing api_key"));
    }

    #[test]
    fn test_from_store_error() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn test_from_core_error() {
        let err: Error = switchboard_core::Error::UnknownEventType("x".into()).into();
        assert!(matches!(err, Error::Core(_)));
        assert!(err.to_string().contains("unknown event type"));
    }
}
