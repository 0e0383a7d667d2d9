//! Shared HTTP plumbing for adapters: one client, one retry policy.
//!
//! Every adapter request goes through [`HttpSender`], which classifies
//! failures into the [`AdapterError`] taxonomy and retries the retryable
//! ones with exponential backoff. The retry budget here is the adapter's
//! own (`max_retries × retry_delay·2^attempt`); the queue-level retry with
//! its longer backoff sits above this.

use std::time::Duration;

use serde_json::Value;

use super::AdapterError;

/// HTTP client wrapper with bounded retry.
pub struct HttpSender {
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpSender {
    pub fn new(
        timeout_secs: u64,
        max_retries: u32,
        retry_delay_secs: u64,
    ) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| AdapterError::Config(format!("http client: {e}")))?;
        Ok(HttpSender {
            client,
            max_retries,
            retry_delay: Duration::from_secs(retry_delay_secs),
        })
    }

    /// POST a JSON body; returns `(status, body)` on a 2xx response.
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<(u16, String), AdapterError> {
        self.with_retry(|| async {
            let response = self
                .client
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(classify_reqwest)?;
            classify_response(response).await
        })
        .await
    }

    /// POST URL-encoded form fields; returns `(status, body)` on 2xx.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<(u16, String), AdapterError> {
        self.with_retry(|| async {
            let response = self
                .client
                .post(url)
                .form(form)
                .send()
                .await
                .map_err(classify_reqwest)?;
            classify_response(response).await
        })
        .await
    }

    /// GET with query parameters; returns `(status, body)` on 2xx.
    pub async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<(u16, String), AdapterError> {
        self.with_retry(|| async {
            let response = self
                .client
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(classify_reqwest)?;
            classify_response(response).await
        })
        .await
    }

    /// Probe a URL; any response (even an error status) proves connectivity.
    pub async fn probe(&self, url: &str) -> bool {
        self.client.get(url).send().await.is_ok()
    }

    async fn with_retry<F, Fut>(&self, op: F) -> Result<(u16, String), AdapterError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(u16, String), AdapterError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_delay * 2u32.saturating_pow(attempt);
                    tracing::debug!(
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "retrying adapter request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify_reqwest(error: reqwest::Error) -> AdapterError {
    if error.is_timeout() {
        AdapterError::Timeout
    } else {
        AdapterError::Connection(error.to_string())
    }
}

async fn classify_response(response: reqwest::Response) -> Result<(u16, String), AdapterError> {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    match status {
        200..=299 => Ok((status, body)),
        401 | 403 => Err(AdapterError::Auth),
        429 => Err(AdapterError::RateLimited),
        _ => Err(AdapterError::Http { status, body }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_construction() {
        let sender = HttpSender::new(30, 3, 2).unwrap();
        assert_eq!(sender.max_retries, 3);
        assert_eq!(sender.retry_delay, Duration::from_secs(2));
        // Zero timeout is clamped rather than rejected.
        assert!(HttpSender::new(0, 0, 0).is_ok());
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let sender = HttpSender::new(1, 5, 0).unwrap();
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = sender
            .with_retry(|| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err::<(u16, String), _>(AdapterError::Auth) }
            })
            .await;
        assert!(matches!(result, Err(AdapterError::Auth)));
        // One probe only: auth failures never retry.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausts() {
        let sender = HttpSender::new(1, 2, 0).unwrap();
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = sender
            .with_retry(|| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async {
                    Err::<(u16, String), _>(AdapterError::Http {
                        status: 502,
                        body: "bad gateway".into(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(AdapterError::Http { status: 502, .. })));
        // Initial attempt + 2 retries.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_first_success() {
        let sender = HttpSender::new(1, 3, 0).unwrap();
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = sender
            .with_retry(|| {
                let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AdapterError::Timeout)
                    } else {
                        Ok((200, "ok".to_string()))
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), (200, "ok".to_string()));
    }
}
