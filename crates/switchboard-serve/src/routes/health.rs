//! Health check endpoint.
//!
//! Reports `healthy`, `degraded`, or `unhealthy`:
//!
//! - unhealthy (503): the store is unreachable
//! - degraded (200): queue backlog over 10,000 pending, failure rate over
//!   10% in the trailing five minutes, or disk over 90% full
//! - healthy (200): everything else

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

const BACKLOG_DEGRADED: i64 = 10_000;
const ERROR_RATE_DEGRADED: f64 = 0.10;
const DISK_DEGRADED: f64 = 0.90;
const ERROR_RATE_WINDOW_SECS: i64 = 300;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    checks: Checks,
    metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
struct Checks {
    database: &'static str,
    queue: &'static str,
    platforms: &'static str,
    disk: &'static str,
    error_rate: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct Metrics {
    pending_jobs: i64,
    active_platforms: usize,
    failure_rate_5m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    disk_used_fraction: Option<f64>,
}

/// Fraction of the filesystem holding `path` that is in use.
fn disk_used_fraction(path: &std::path::Path) -> Option<f64> {
    let target = if path.as_os_str().is_empty() {
        std::path::Path::new(".")
    } else {
        path
    };
    let stat = nix::sys::statvfs::statvfs(target).ok()?;
    let total = stat.blocks() as f64;
    if total == 0.0 {
        return None;
    }
    let available = stat.blocks_available() as f64;
    Some(1.0 - available / total)
}

/// `GET /health`
///
/// Public liveness endpoint for load balancers and monitors. Returns 503
/// only when the store is unreachable; degradation still answers 200.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    // Store reachability decides healthy vs unhealthy outright.
    let database_ok = state.store.ping().is_ok();
    if !database_ok {
        let response = HealthResponse {
            status: "unhealthy",
            version: env!("CARGO_PKG_VERSION"),
            checks: Checks {
                database: "unreachable",
                queue: "unknown",
                platforms: "unknown",
                disk: "unknown",
                error_rate: "unknown",
            },
            metrics: Metrics {
                pending_jobs: -1,
                active_platforms: 0,
                failure_rate_5m: 0.0,
                disk_used_fraction: None,
            },
        };
        return (StatusCode::SERVICE_UNAVAILABLE, Json(response));
    }

    let pending = state.store.pending_job_count().unwrap_or(0);
    let (failures, total) = state
        .store
        .processing_failure_rate(ERROR_RATE_WINDOW_SECS)
        .unwrap_or((0, 0));
    let failure_rate = if total > 0 {
        failures as f64 / total as f64
    } else {
        0.0
    };
    let disk = disk_used_fraction(
        state
            .config
            .db_path
            .parent()
            .unwrap_or(std::path::Path::new(".")),
    );
    let active_platforms = state.router.active_platform_count();

    let queue_check = if pending > BACKLOG_DEGRADED { "backlog" } else { "ok" };
    let error_check = if total > 0 && failure_rate >= ERROR_RATE_DEGRADED {
        "elevated"
    } else {
        "ok"
    };
    let disk_check = match disk {
        Some(used) if used > DISK_DEGRADED => "full",
        Some(_) => "ok",
        None => "unknown",
    };
    let platform_check = if active_platforms > 0 { "ok" } else { "none_active" };

    let degraded = queue_check != "ok" || error_check != "ok" || disk_check == "full";
    let response = HealthResponse {
        status: if degraded { "degraded" } else { "healthy" },
        version: env!("CARGO_PKG_VERSION"),
        checks: Checks {
            database: "ok",
            queue: queue_check,
            platforms: platform_check,
            disk: disk_check,
            error_rate: error_check,
        },
        metrics: Metrics {
            pending_jobs: pending,
            active_platforms,
            failure_rate_5m: failure_rate,
            disk_used_fraction: disk,
        },
    };
    (StatusCode::OK, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_healthy_on_empty_store() {
        let state = AppState::for_tests();
        let (status, Json(body)) = health_check(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        // A nearly-full test machine disk may legitimately degrade this.
        assert!(body.status == "healthy" || body.status == "degraded");
        assert_eq!(body.checks.database, "ok");
        assert_eq!(body.checks.queue, "ok");
        assert_eq!(body.checks.error_rate, "ok");
    }

    #[tokio::test]
    async fn test_degraded_on_error_rate() {
        let state = AppState::for_tests();
        let mut event = switchboard_core::Event::from_submission(
            switchboard_core::EventType::Lead,
            &serde_json::Map::new(),
        );
        state.store.insert_event(&mut event).unwrap();
        let platform = state
            .store
            .insert_platform_raw("leadcrm", "CRM", "crm", true, "{}", 10)
            .unwrap();
        // Nine failures out of ten sends in the window.
        for i in 0..10 {
            state
                .store
                .append_processing_log(&switchboard_pipeline::store::ProcessingLogEntry {
                    event_id: event.id,
                    platform_id: platform,
                    job_id: None,
                    action: "send".into(),
                    request_fields: None,
                    response_code: Some(if i == 0 { 200 } else { 502 }),
                    response_body: None,
                    success: i == 0,
                })
                .unwrap();
        }

        let (status, Json(body)) = health_check(State(state)).await;
        assert_eq!(status, StatusCode::OK, "degraded still answers 200");
        assert_eq!(body.status, "degraded");
        assert_eq!(body.checks.error_rate, "elevated");
    }

    #[test]
    fn test_disk_fraction_is_sane() {
        let fraction = disk_used_fraction(std::path::Path::new("."));
        if let Some(used) = fraction {
            assert!((0.0..=1.0).contains(&used));
        }
    }
}
