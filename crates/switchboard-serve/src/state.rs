//! Application state and configuration.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use switchboard_pipeline::{
    adapters::AdapterFactory, processor::ProcessorConfig, Processor, Queue, ReadyIndex, Router,
    Store, ValidatorConfig,
};

use crate::cache::{new_cache, ResponseCache};

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080").
    pub bind_addr: String,

    /// SQLite database path.
    pub db_path: PathBuf,

    /// Valid API tokens (loaded from SWITCHBOARD_API_TOKENS).
    pub api_tokens: HashSet<String>,

    /// Email-validation cache TTL in days.
    pub validation_cache_days: i64,

    /// Daily budget of outbound validation calls.
    pub validation_daily_limit: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `SWITCHBOARD_API_TOKENS`: Comma-separated list of valid API tokens
    ///
    /// Optional environment variables:
    /// - `SWITCHBOARD_BIND_ADDR`: Server bind address (default: "0.0.0.0:8080")
    /// - `SWITCHBOARD_DB_PATH`: Database path (default: "./data/switchboard.db")
    /// - `VALIDATION_CACHE_DAYS`: Email cache TTL (default: 30)
    /// - `ZEROBOUNCE_DAILY_LIMIT`: Validation budget (default: 10000)
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr =
            std::env::var("SWITCHBOARD_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let db_path = std::env::var("SWITCHBOARD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/switchboard.db"));

        let tokens_str = std::env::var("SWITCHBOARD_API_TOKENS").map_err(|_| {
            anyhow::anyhow!("SWITCHBOARD_API_TOKENS environment variable is required")
        })?;

        let api_tokens: HashSet<String> = tokens_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if api_tokens.is_empty() {
            anyhow::bail!("SWITCHBOARD_API_TOKENS must contain at least one token");
        }

        let validation_cache_days = std::env::var("VALIDATION_CACHE_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(switchboard_core::DEFAULT_VALIDATION_CACHE_DAYS);

        let validation_daily_limit = std::env::var("ZEROBOUNCE_DAILY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(switchboard_core::DEFAULT_VALIDATION_DAILY_LIMIT);

        tracing::info!(
            bind_addr = %bind_addr,
            db_path = ?db_path,
            token_count = api_tokens.len(),
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            db_path,
            api_tokens,
            validation_cache_days,
            validation_daily_limit,
        })
    }
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The pipeline store.
    pub store: Arc<Store>,

    /// Router caches (also used by the health check).
    pub router: Arc<Router>,

    /// Queue facade (used for depth reporting).
    pub queue: Arc<Queue>,

    /// Intake orchestrator.
    pub processor: Arc<Processor>,

    /// Response cache for stats queries.
    pub cache: ResponseCache,

    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Create application state from configuration, opening the store and
    /// wiring the intake pipeline.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(Store::open(&config.db_path)?);
        let router = Arc::new(Router::new(Arc::clone(&store))?);
        let queue = Arc::new(Queue::new(
            Arc::clone(&store),
            Some(Arc::new(ReadyIndex::new())),
        ));
        let processor = Arc::new(Processor::new(
            Arc::clone(&store),
            Arc::clone(&router),
            Arc::clone(&queue),
            Arc::new(AdapterFactory::with_defaults()),
            ProcessorConfig {
                validator: ValidatorConfig {
                    cache_ttl_days: config.validation_cache_days,
                    ..ValidatorConfig::default()
                },
                validation_daily_limit: config.validation_daily_limit,
            },
        ));

        Ok(Self {
            store,
            router,
            queue,
            processor,
            cache: new_cache(),
            config: Arc::new(config),
        })
    }

    /// In-memory state for tests.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let store = Arc::new(Store::in_memory().unwrap());
        let router = Arc::new(Router::new(Arc::clone(&store)).unwrap());
        let queue = Arc::new(Queue::new(Arc::clone(&store), None));
        let processor = Arc::new(Processor::new(
            Arc::clone(&store),
            Arc::clone(&router),
            Arc::clone(&queue),
            Arc::new(AdapterFactory::with_defaults()),
            ProcessorConfig::default(),
        ));
        Self {
            store,
            router,
            queue,
            processor,
            cache: new_cache(),
            config: Arc::new(Config {
                bind_addr: "127.0.0.1:0".into(),
                db_path: ":memory:".into(),
                api_tokens: ["test-token".to_string()].into_iter().collect(),
                validation_cache_days: 30,
                validation_daily_limit: 10_000,
            }),
        }
    }
}
