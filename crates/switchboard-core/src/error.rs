//! Error types for the Switchboard event pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or evaluating domain objects.
#[derive(Error, Debug)]
pub enum Error {
    /// A submitted field failed format validation.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// The name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },

    /// A phone number could not be canonicalized to 11 digits.
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    /// An unknown event type string was supplied.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// An unknown platform type string was supplied.
    #[error("unknown platform type: {0}")]
    UnknownPlatformType(String),

    /// A routing rule condition could not be parsed.
    #[error("invalid routing condition on field '{field}': {reason}")]
    InvalidCondition {
        /// The event field the condition applies to.
        field: String,
        /// Why the predicate is malformed.
        reason: String,
    },

    /// A regex operator carried an invalid pattern.
    #[error("invalid condition regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
