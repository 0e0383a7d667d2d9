//! In-memory response caching with moka.
//!
//! Provides server-side caching for the stats queries, which aggregate over
//! the whole queue and log tables. Each cached entry stores serialized JSON
//! with metadata, enabling fast responses for repeated requests.
//!
//! ## Cache Key Strategy
//!
//! Cache keys should include the endpoint name and every query parameter
//! that affects the response (e.g. `stats:24h`).

use std::future::Future;
use std::time::Duration;

use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ApiError;

/// Default cache capacity (number of entries).
pub const DEFAULT_CACHE_CAPACITY: u64 = 100;

/// Default TTL for cached entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Cached response with metadata.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    /// Serialized JSON response.
    pub json: String,
    /// When this entry was cached.
    pub cached_at: chrono::DateTime<chrono::Utc>,
}

/// Type alias for the response cache.
pub type ResponseCache = Cache<String, CachedEntry>;

/// Create a new response cache with default settings.
pub fn new_cache() -> ResponseCache {
    Cache::builder()
        .max_capacity(DEFAULT_CACHE_CAPACITY)
        .time_to_live(DEFAULT_TTL)
        .build()
}

/// Get a cached value or compute and cache it.
///
/// 1. Checks for a valid cached entry under the key
/// 2. If found, deserializes and returns it
/// 3. If not, calls the compute function, caches, and returns
pub async fn get_or_compute<T, F, Fut>(
    cache: &ResponseCache,
    key: &str,
    compute: F,
) -> Result<T, ApiError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    if let Some(entry) = cache.get(key).await {
        match serde_json::from_str(&entry.json) {
            Ok(value) => {
                tracing::debug!(key = %key, cached_at = %entry.cached_at, "cache hit");
                return Ok(value);
            }
            Err(e) => {
                // Corrupted cache entry - log and continue to recompute
                tracing::warn!(key = %key, error = %e, "failed to deserialize cached entry");
            }
        }
    }

    tracing::debug!(key = %key, "cache miss, computing");
    let value = compute().await?;

    match serde_json::to_string(&value) {
        Ok(json) => {
            let entry = CachedEntry {
                json,
                cached_at: chrono::Utc::now(),
            };
            cache.insert(key.to_string(), entry).await;
        }
        Err(e) => {
            // Failed to serialize - log but still return the value
            tracing::warn!(key = %key, error = %e, "failed to serialize for cache");
        }
    }

    Ok(value)
}
