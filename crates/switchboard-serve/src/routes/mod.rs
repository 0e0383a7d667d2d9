//! API route definitions.
//!
//! The submission endpoints are public: they sit directly behind web
//! forms. Only the operator surface (`/stats`) is token-gated, so the
//! gate lives here next to the route it protects instead of as a general
//! auth layer.

mod events;
mod health;
mod stats;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the complete API router.
///
/// # Route Structure
///
/// ## Public (no auth)
/// - `POST /events/lead` - Accept a lead submission
/// - `POST /events/purchase` - Accept a purchase
/// - `GET /health` - Liveness and component status
///
/// ## Protected (operator token required)
/// - `GET /stats?period=1h|24h|7d|30d` - Summary counters
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/events/lead", post(events::submit_lead))
        .route("/events/purchase", post(events::submit_purchase))
        .route("/health", get(health::health_check));

    let operator = Router::new()
        .route("/stats", get(stats::stats))
        .layer(middleware::from_fn_with_state(state.clone(), operator_auth));

    Router::new().merge(public).merge(operator).with_state(state)
}

/// Extract the operator token a request presented, if any.
///
/// Dashboards and curl users send `Authorization: Bearer <token>`;
/// scheduled reporting jobs tend to send a bare `X-Api-Key` header.
/// Both name the same token set from `SWITCHBOARD_API_TOKENS`.
fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let api_key = headers.get("x-api-key").and_then(|value| value.to_str().ok());

    bearer
        .or(api_key)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
}

/// Middleware gating the operator routes on a configured token.
pub async fn operator_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match presented_token(request.headers()) {
        Some(token) if state.config.api_tokens.contains(&token) => Ok(next.run(request).await),
        Some(_) => {
            tracing::debug!(path = %request.uri().path(), "unknown operator token");
            Err(ApiError::Unauthorized)
        }
        None => {
            tracing::debug!(path = %request.uri().path(), "no operator token presented");
            Err(ApiError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_bearer_token_extracted() {
        let token = presented_token(&headers(&[("authorization", "Bearer tok-123")]));
        assert_eq!(token.as_deref(), Some("tok-123"));
    }

    #[test]
    fn test_api_key_header_extracted() {
        let token = presented_token(&headers(&[("x-api-key", "tok-456")]));
        assert_eq!(token.as_deref(), Some("tok-456"));
    }

    #[test]
    fn test_bearer_wins_when_both_present() {
        let token = presented_token(&headers(&[
            ("authorization", "Bearer from-bearer"),
            ("x-api-key", "from-key"),
        ]));
        assert_eq!(token.as_deref(), Some("from-bearer"));
    }

    #[test]
    fn test_malformed_or_missing_yields_none() {
        assert!(presented_token(&headers(&[])).is_none());
        // Wrong scheme is not a token.
        assert!(presented_token(&headers(&[("authorization", "Basic dXNlcg==")])).is_none());
        // A bare "Bearer " with nothing after it is not a token either.
        assert!(presented_token(&headers(&[("authorization", "Bearer ")])).is_none());
        assert!(presented_token(&headers(&[("x-api-key", "   ")])).is_none());
    }

    #[test]
    fn test_token_is_trimmed() {
        let token = presented_token(&headers(&[("authorization", "Bearer  padded  ")]));
        assert_eq!(token.as_deref(), Some("padded"));
    }
}
