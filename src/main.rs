//! ArenaBot - Base-network trading arena backend
//! Rounds, virtual portfolios, LLM strategy signals, live leaderboards.

use anyhow::{Context, Result};
use arenabot_backend::{
    api::{self, AppState},
    events::EventBus,
    feeds::{DexScreenerSource, PriceFeed},
    llm::{GroqChat, LlmClient, LlmClientConfig},
    models::Config,
    rounds::RoundManager,
    store::{FailoverStore, KvStore, RedisStore},
    strategy::StrategyRegistry,
};
use axum::http::HeaderValue;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        network = %config.network,
        store_mode = ?config.store_mode,
        "starting arenabot backend"
    );

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("building http client")?;

    // External store is optional; the failover wrapper applies the
    // configured permissive/strict policy either way.
    let primary: Option<Arc<dyn KvStore>> = match &config.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "redis unavailable at boot; starting on in-memory store");
                None
            }
        },
        None => {
            info!("no redis configured; using in-memory store");
            None
        }
    };
    let store: Arc<dyn KvStore> = Arc::new(FailoverStore::new(primary, config.store_mode));

    let feed = Arc::new(PriceFeed::new(
        Arc::new(DexScreenerSource::new(http_client.clone())),
        config.network.clone(),
        Duration::from_millis(config.price_cache_ttl_ms),
    ));

    if config.groq_api_key.is_none() {
        warn!("GROQ_API_KEY not set; LLM calls will fail over to repaired defaults");
    }
    let chat = GroqChat::new(
        http_client.clone(),
        config.groq_api_key.clone().unwrap_or_default(),
        config.groq_model.clone(),
    );
    let llm = LlmClient::spawn(
        Arc::new(chat),
        LlmClientConfig {
            min_interval: Duration::from_millis(config.llm_min_interval_ms),
            post_delay: Duration::from_millis(config.llm_post_delay_ms),
            backoff: Duration::from_millis(config.llm_backoff_ms),
            ..LlmClientConfig::default()
        },
    );

    let registry = Arc::new(StrategyRegistry::new(store.clone(), llm.clone()));
    let bus = EventBus::new();
    let rounds = RoundManager::new(
        store.clone(),
        feed.clone(),
        llm.clone(),
        registry.clone(),
        bus.clone(),
    );

    // Pick rounds that were mid-flight when the process last stopped.
    rounds.resume_running_rounds().await;

    let cors = if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let state = AppState {
        store,
        feed,
        llm,
        registry,
        rounds,
        bus,
    };
    let app = api::router(state).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
