//! Authenticated summary counters.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::cache::get_or_compute;
use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for stats.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsQuery {
    /// Reporting window: `1h`, `24h`, `7d`, or `30d` (default `24h`).
    pub period: Option<String>,
}

/// Per-platform delivery counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCount {
    pub platform: String,
    pub status: String,
    pub count: i64,
}

/// Stats payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub period: String,
    /// Window start (Unix seconds).
    pub since: i64,
    /// Event counts by lifecycle status, within the window.
    pub events: BTreeMap<String, i64>,
    /// Job counts by status (current queue contents, not windowed).
    pub jobs: BTreeMap<String, i64>,
    /// Terminal deliveries per platform within the window.
    pub platforms: Vec<PlatformCount>,
    /// Gross revenue recorded within the window.
    pub revenue_gross: f64,
}

fn period_secs(period: &str) -> Option<i64> {
    match period {
        "1h" => Some(3_600),
        "24h" => Some(86_400),
        "7d" => Some(7 * 86_400),
        "30d" => Some(30 * 86_400),
        _ => None,
    }
}

/// `GET /stats?period=1h|24h|7d|30d`
pub async fn stats(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let period = params.period.unwrap_or_else(|| "24h".to_string());
    let Some(window) = period_secs(&period) else {
        return Err(ApiError::BadRequest(format!(
            "unknown period '{period}'; expected 1h|24h|7d|30d"
        )));
    };

    let cache_key = format!("stats:{period}");
    let response = get_or_compute(&state.cache, &cache_key, || async {
        let since = chrono::Utc::now().timestamp() - window;

        let events: BTreeMap<String, i64> = state
            .store
            .count_events_by_status(since)
            .map_err(anyhow::Error::from)?
            .into_iter()
            .collect();
        let jobs: BTreeMap<String, i64> = state
            .store
            .count_jobs_by_status()
            .map_err(anyhow::Error::from)?
            .into_iter()
            .collect();
        let platforms = state
            .store
            .count_deliveries_by_platform(since)
            .map_err(anyhow::Error::from)?
            .into_iter()
            .map(|(platform, status, count)| PlatformCount {
                platform,
                status,
                count,
            })
            .collect();
        let revenue_gross = state
            .store
            .revenue_since(since)
            .map_err(anyhow::Error::from)?;

        Ok(StatsResponse {
            period: period.clone(),
            since,
            events,
            jobs,
            platforms,
            revenue_gross,
        })
    })
    .await?;

    Ok(Json(response))
}
