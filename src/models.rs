use serde::{Deserialize, Serialize};

/// How the engine reacts when the external store is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Downgrade store failures to empty/default results and serve writes
    /// from the in-memory backend.
    Permissive,
    /// Surface store failures as `StoreUnavailable`.
    Strict,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: Option<String>,
    pub store_mode: StoreMode,
    pub groq_api_key: Option<String>,
    pub groq_model: String,
    pub llm_min_interval_ms: u64,
    pub llm_post_delay_ms: u64,
    pub llm_backoff_ms: u64,
    pub price_cache_ttl_ms: u64,
    pub network: String,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        // REDIS_URL wins; otherwise assemble from host/port/password parts.
        let redis_url = std::env::var("REDIS_URL").ok().or_else(|| {
            let host = std::env::var("REDIS_HOST").ok()?;
            let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
            let auth = std::env::var("REDIS_PASSWORD")
                .map(|p| format!(":{p}@"))
                .unwrap_or_default();
            Some(format!("redis://{auth}{host}:{port}"))
        });

        let store_mode = match std::env::var("STORE_MODE").as_deref() {
            Ok("strict") => StoreMode::Strict,
            _ => StoreMode::Permissive,
        };

        let groq_api_key = std::env::var("GROQ_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let groq_model =
            std::env::var("GROQ_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".to_string());

        let llm_min_interval_ms = std::env::var("LLM_MIN_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(2000);

        let llm_post_delay_ms = std::env::var("LLM_POST_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1000);

        let llm_backoff_ms = std::env::var("LLM_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10_000);

        let price_cache_ttl_ms = std::env::var("PRICE_CACHE_TTL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(30_000);

        let network = std::env::var("NETWORK").unwrap_or_else(|_| "base".to_string());

        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            port,
            redis_url,
            store_mode,
            groq_api_key,
            groq_model,
            llm_min_interval_ms,
            llm_post_delay_ms,
            llm_backoff_ms,
            price_cache_ttl_ms,
            network,
            cors_origins,
        })
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
