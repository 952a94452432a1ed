//! Shared fixtures: scripted chat backends, a scripted price source, and a
//! fully wired round manager running on the in-memory store.

use arenabot_backend::events::EventBus;
use arenabot_backend::feeds::{MarketSnapshot, PriceFeed, PriceSource, SnapshotSource, TokenInfo};
use arenabot_backend::llm::{ChatApi, ChatError, LlmClient, LlmClientConfig};
use arenabot_backend::rounds::RoundManager;
use arenabot_backend::store::{FailoverStore, KvStore};
use arenabot_backend::strategy::StrategyRegistry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Fixed per-symbol prices; anything missing reports the dex as down.
pub struct FixedPrices {
    prices: HashMap<&'static str, f64>,
}

impl FixedPrices {
    pub fn new(prices: &[(&'static str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            prices: prices.iter().copied().collect(),
        })
    }
}

#[async_trait]
impl PriceSource for FixedPrices {
    async fn dex_snapshot(
        &self,
        token: &TokenInfo,
        _network: &str,
        _min_liquidity: f64,
    ) -> anyhow::Result<MarketSnapshot> {
        let price = self
            .prices
            .get(token.symbol)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no scripted price for {}", token.symbol))?;
        Ok(MarketSnapshot {
            symbol: token.symbol.to_string(),
            price,
            change_24h: 1.0,
            volume_24h: 1_000_000.0,
            liquidity: 2_000_000.0,
            market_cap: 1e9,
            source: SnapshotSource::Dex,
            ts: chrono::Utc::now().timestamp_millis(),
        })
    }

    async fn spot_snapshot(&self, _token: &TokenInfo) -> anyhow::Result<MarketSnapshot> {
        anyhow::bail!("spot disabled in tests")
    }
}

/// Parse prompts get a two-asset strategy; signal prompts get BUY on ETH
/// and HOLD on everything else.
pub struct BuyEthChat;

#[async_trait]
impl ChatApi for BuyEthChat {
    async fn chat(&self, _: &str, user: &str, _: u32, _: f64) -> Result<String, ChatError> {
        if user.contains("Analyze this trading strategy") || user.contains("round configuration") {
            return Ok(r#"{
                "strategy_type": "technical",
                "indicators": ["momentum"],
                "entry_conditions": "buy strength",
                "exit_conditions": "sell weakness",
                "risk_management": "confidence sizing",
                "timeframe": "5m",
                "assets": ["ETH", "TOSHI"],
                "base_ecosystem": true,
                "clarity_score": 8,
                "actionable": true,
                "suggested_base_tokens": ["ETH", "TOSHI"]
            }"#
            .to_string());
        }
        if user.contains("Market data for ETH") {
            return Ok(r#"{
                "signal": "BUY", "confidence": 7, "reason": "uptrend",
                "entry_price": 3000, "stop_loss": 2850,
                "take_profit": 3300, "risk_reward": 2.0
            }"#
            .to_string());
        }
        Ok(r#"{"signal": "HOLD", "confidence": 5, "reason": "no edge"}"#.to_string())
    }
}

/// Every call fails with a 5xx-style upstream error.
pub struct OutageChat;

#[async_trait]
impl ChatApi for OutageChat {
    async fn chat(&self, _: &str, _: &str, _: u32, _: f64) -> Result<String, ChatError> {
        Err(ChatError::Upstream("503 service unavailable".into()))
    }
}

pub struct Harness {
    pub store: Arc<dyn KvStore>,
    pub feed: Arc<PriceFeed>,
    pub llm: Arc<LlmClient>,
    pub registry: Arc<StrategyRegistry>,
    pub rounds: Arc<RoundManager>,
    pub bus: EventBus,
}

/// Wire the whole engine against the in-memory store with fast LLM pacing.
pub fn harness(chat: Arc<dyn ChatApi>, prices: Arc<FixedPrices>) -> Harness {
    let store: Arc<dyn KvStore> = Arc::new(FailoverStore::memory_only());
    let feed = Arc::new(PriceFeed::new(prices, "base", Duration::from_secs(30)));
    let llm = LlmClient::spawn(
        chat,
        LlmClientConfig {
            min_interval: Duration::from_millis(1),
            post_delay: Duration::from_millis(0),
            backoff: Duration::from_millis(5),
            max_rate_limit_retries: 2,
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
    Harness {
        store,
        feed,
        llm,
        registry,
        rounds,
        bus,
    }
}

pub fn eth_toshi_prices() -> Arc<FixedPrices> {
    FixedPrices::new(&[("ETH", 3000.0), ("TOSHI", 0.0001)])
}
