//! Switchboard Serve - HTTP intake API for lead and purchase events.
//!
//! This crate provides the public submission endpoints that feed the
//! pipeline, plus health and stats surfaces for operators.
//!
//! # Authentication
//!
//! Submission endpoints are public (they sit behind web forms). The stats
//! endpoint requires an operator token, presented as a Bearer header or an
//! `X-Api-Key` header; tokens are configured via environment variables
//! (typically in a `.env` file). The gate lives in the routes module, next
//! to the one route it protects.
//!
//! # Architecture
//!
//! - **AppState**: shared state (store, processor, response cache, config)
//! - **Routes**: endpoint handlers grouped by domain, plus the operator gate

pub mod cache;
mod error;
mod routes;
mod state;

pub use self::cache::{get_or_compute, new_cache, ResponseCache};
pub use self::error::ApiError;
pub use self::routes::router;
pub use self::state::{AppState, Config};
