//! Prometheus metrics helpers for the Switchboard system.
//!
//! This module provides centralized metrics initialization and common metric
//! definitions used across Switchboard components.
//!
//! # Usage
//!
//! ```rust,ignore
//! use switchboard_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Initialize the Prometheus recorder
//!     let handle = init_metrics();
//!
//!     // Start the HTTP server for /metrics endpoint
//!     start_metrics_server(9091, handle).await.unwrap();
//!
//!     // Now use metrics anywhere in your code
//!     use metrics::{counter, gauge};
//!     counter!("intake_events_total").increment(1);
//!     gauge!("queue_depth_pending").set(42.0);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`intake_`, `queue_`, `adapter_`, `worker_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: use sparingly to avoid cardinality explosion

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
/// Returns a handle that can be used with [`start_metrics_server`].
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Try to initialize the Prometheus metrics recorder.
///
/// Like [`init_metrics`] but returns `None` if the recorder is already
/// installed, instead of panicking. Useful for tests or optional metrics.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves the `/metrics` endpoint on the specified port.
/// This spawns a background task and returns immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });

    Ok(())
}

/// Register descriptions for common metrics used across Switchboard.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    // =========================================================================
    // Intake Metrics
    // =========================================================================

    describe_counter!(
        "intake_events_total",
        "Total submissions received at the intake endpoints"
    );
    describe_counter!(
        "intake_events_accepted_total",
        "Submissions that passed validation and entered the pipeline"
    );
    describe_counter!(
        "intake_events_blocked_total",
        "Submissions blocked at intake (label: reason)"
    );
    describe_counter!(
        "intake_bots_detected_total",
        "Bot submissions caught by the honeypot or registry"
    );
    describe_histogram!(
        "intake_processing_seconds",
        "Wall time spent accepting one submission"
    );

    // =========================================================================
    // Queue Metrics
    // =========================================================================

    describe_counter!("queue_jobs_enqueued_total", "Jobs created at fanout");
    describe_counter!("queue_jobs_completed_total", "Jobs delivered successfully");
    describe_counter!("queue_jobs_failed_total", "Jobs failed after max retries");
    describe_counter!("queue_jobs_retried_total", "Retry transitions scheduled");
    describe_counter!(
        "queue_jobs_skipped_total",
        "Jobs skipped (label: reason)"
    );
    describe_counter!(
        "queue_jobs_reaped_total",
        "Stuck leases recovered by the reaper"
    );
    describe_gauge!("queue_depth_pending", "Jobs currently pending");
    describe_gauge!("queue_depth_processing", "Jobs currently leased");

    // =========================================================================
    // Adapter Metrics
    // =========================================================================

    describe_counter!(
        "adapter_sends_total",
        "Adapter delivery attempts (label: platform)"
    );
    describe_counter!(
        "adapter_send_errors_total",
        "Adapter delivery errors (label: platform)"
    );
    describe_histogram!(
        "adapter_send_duration_seconds",
        "Time spent in one adapter send"
    );
    describe_counter!(
        "adapter_revenue_cents_total",
        "Revenue recorded from monetization platforms, in cents"
    );

    // =========================================================================
    // Worker Metrics
    // =========================================================================

    describe_gauge!("worker_running", "Whether a worker loop is live (1/0)");
    describe_counter!("worker_batches_total", "Batches leased by workers");
    describe_gauge!("worker_batch_size_last", "Jobs in the last leased batch");
}

// =============================================================================
// Metric Recording Helpers
// =============================================================================

/// Increment a counter with a platform label.
#[inline]
pub fn count_platform(name: &'static str, platform: String) {
    metrics::counter!(name, "platform" => platform).increment(1);
}

/// Increment a counter.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Set a gauge value.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}
