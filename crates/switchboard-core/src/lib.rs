//! Core types and shared utilities for the Switchboard event pipeline.
//!
//! This crate provides:
//! - The `Event` domain model and submission normalization (email, phone, name)
//! - Queue job and platform definitions
//! - Routing rule conditions and evaluation
//! - Bot and email-validation registry value types
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
pub mod event;
pub mod job;
pub mod metrics;
pub mod platform;
pub mod registry;
pub mod revenue;
pub mod routing;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Default number of delivery attempts per job before it is marked failed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default lease duration for a claimed queue job, in seconds.
pub const DEFAULT_LEASE_SECONDS: i64 = 300;

/// Default email-validation cache TTL, in days.
pub const DEFAULT_VALIDATION_CACHE_DAYS: i64 = 30;

/// Default daily budget of outbound email-validation calls.
pub const DEFAULT_VALIDATION_DAILY_LIMIT: u32 = 10_000;

pub use error::{Error, Result};
pub use event::{
    canonicalize_phone, email_fingerprint, is_valid_email_format, normalize_email, split_name,
    EmailValidationStatus, Event, EventStatus, EventType,
};
pub use job::{backoff_delay_secs, JobStatus, QueueJob};
pub use platform::{PlatformDefinition, PlatformType};
pub use registry::{
    map_zerobounce_status, BotEntry, BotIdentifierType, BotSeverity, EmailValidationEntry,
    is_permanent_invalid_substatus,
};
pub use revenue::{EventRelationship, RevenueRecord, RevenueStatus, RELATIONSHIP_LEAD_TO_PURCHASE};
pub use routing::{Condition, RoutingRule};
