//! Event intake endpoints.
//!
//! Both endpoints accept a flat JSON object of submitted form fields. The
//! lead endpoint serves real browsers mid-journey: when the submission
//! carries a `redirect_url`, the user is 302-redirected to the confirmation
//! page no matter what happened internally, so a backend hiccup never
//! strands a visitor on an error page. JSON clients get structured results:
//! 200 on accepted, 400 on a blocked submission.

use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};
use switchboard_core::EventType;

use crate::state::AppState;

/// Response body for the lead endpoint (JSON clients).
#[derive(Debug, Clone, Serialize)]
pub struct LeadResponse {
    pub success: bool,
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    pub processing_time: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Response body for the purchase endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseResponse {
    pub success: bool,
    pub event_id: String,
    pub status: String,
    pub processing_time: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Normalize the request body into a submission map, folding in the caller
/// IP from proxy headers when the form did not carry one.
fn submission_map(body: Value, headers: &HeaderMap) -> Option<Map<String, Value>> {
    let mut raw = match body {
        Value::Object(map) => map,
        _ => return None,
    };
    if !raw.contains_key("ip") {
        if let Some(ip) = client_ip(headers) {
            raw.insert("ip".to_string(), Value::String(ip));
        }
    }
    Some(raw)
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `POST /events/lead`
pub async fn submit_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let started = Instant::now();
    let Some(raw) = submission_map(body, &headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "errors": ["submission body must be a JSON object"],
            })),
        )
            .into_response();
    };

    let redirect_url = raw
        .get("redirect_url")
        .and_then(Value::as_str)
        .map(str::to_string);

    let result = state.processor.intake(EventType::Lead, &raw);

    // Browser navigation: the user journey wins over our internals.
    if let Some(url) = &redirect_url {
        if let Err(e) = &result {
            tracing::error!(error = %e, "lead intake failed; redirecting anyway");
        }
        return Redirect::to(url).into_response();
    }

    match result {
        Ok(outcome) => {
            let response = LeadResponse {
                success: outcome.success,
                event_id: outcome.event_id,
                redirect_url: None,
                processing_time: started.elapsed().as_secs_f64(),
                errors: outcome.errors,
            };
            let status = if response.success {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(response)).into_response()
        }
        Err(e) => crate::error::ApiError::from(e).into_response(),
    }
}

/// `POST /events/purchase`
pub async fn submit_purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let started = Instant::now();
    let Some(raw) = submission_map(body, &headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "errors": ["submission body must be a JSON object"],
            })),
        )
            .into_response();
    };

    match state.processor.intake(EventType::Purchase, &raw) {
        Ok(outcome) => {
            let response = PurchaseResponse {
                success: outcome.success,
                event_id: outcome.event_id,
                status: outcome.status.as_str().to_string(),
                processing_time: started.elapsed().as_secs_f64(),
                errors: outcome.errors,
            };
            let status = if response.success {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(response)).into_response()
        }
        Err(e) => crate::error::ApiError::from(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_lead_accepted_returns_200() {
        let state = AppState::for_tests();
        let response = submit_lead(
            State(state.clone()),
            HeaderMap::new(),
            Json(json!({"email": "a@b.com", "phone": "8005550100"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_lead_honeypot_returns_400() {
        let state = AppState::for_tests();
        let response = submit_lead(
            State(state.clone()),
            HeaderMap::new(),
            Json(json!({"email": "a@b.com", "zipcode": "90210"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_lead_with_redirect_always_redirects() {
        let state = AppState::for_tests();
        // Even a blocked (honeypot) submission redirects the browser.
        let response = submit_lead(
            State(state.clone()),
            HeaderMap::new(),
            Json(json!({
                "email": "a@b.com",
                "zipcode": "90210",
                "redirect_url": "https://example.com/thanks"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "https://example.com/thanks"
        );
    }

    #[tokio::test]
    async fn test_non_object_body_rejected() {
        let state = AppState::for_tests();
        let response = submit_lead(
            State(state.clone()),
            HeaderMap::new(),
            Json(json!(["not", "an", "object"])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_purchase_returns_structured_json() {
        let state = AppState::for_tests();
        let response = submit_purchase(
            State(state.clone()),
            HeaderMap::new(),
            Json(json!({"email": "u@x.com", "amount": 10})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forwarded_ip_lands_on_event() {
        let state = AppState::for_tests();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.1.2.3, 172.16.0.1".parse().unwrap());
        let response = submit_lead(
            State(state.clone()),
            headers,
            Json(json!({"email": "ip@test.com"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let events = state.store.find_events_by_email("ip@test.com").unwrap();
        assert_eq!(events[0].ip_address.as_deref(), Some("10.1.2.3"));
    }
}
