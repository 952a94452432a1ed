//! Market data for whitelisted Base tokens.
//!
//! Cache-first: every symbol keeps its last snapshot for a fixed TTL and
//! concurrent misses for the same symbol collapse into one upstream fetch.
//! Upstream order is DEX aggregator, then generic spot price, then a mock
//! snapshot seeded from the token's reference price. Mock data is tagged
//! `source = mock` so clients and tests can detect it.

mod dexscreener;

pub use dexscreener::DexScreenerSource;

use crate::errors::{CoreError, CoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Dex,
    Spot,
    Mock,
}

/// Market data for one symbol at an instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: f64,
    pub change_24h: f64,
    pub volume_24h: f64,
    pub liquidity: f64,
    pub market_cap: f64,
    pub source: SnapshotSource,
    pub ts: i64,
}

/// Whitelist entry: symbol plus the metadata upstream lookups need.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub symbol: &'static str,
    pub name: &'static str,
    pub address: &'static str,
    #[serde(skip)]
    pub coingecko_id: Option<&'static str>,
    /// Seed for mock snapshots when every upstream is down.
    #[serde(skip)]
    pub reference_price: f64,
}

/// Base-network tokens the engine will quote.
const SUPPORTED_TOKENS: &[TokenInfo] = &[
    TokenInfo {
        symbol: "ETH",
        name: "Ethereum",
        address: "0x4200000000000000000000000000000000000006",
        coingecko_id: Some("ethereum"),
        reference_price: 3000.0,
    },
    TokenInfo {
        symbol: "WETH",
        name: "Wrapped Ether",
        address: "0x4200000000000000000000000000000000000006",
        coingecko_id: Some("weth"),
        reference_price: 3000.0,
    },
    TokenInfo {
        symbol: "USDC",
        name: "USD Coin",
        address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
        coingecko_id: Some("usd-coin"),
        reference_price: 1.0,
    },
    TokenInfo {
        symbol: "TOSHI",
        name: "Toshi",
        address: "0xAC1Bd2486aAf3B5C0fc3Fd868558b082a531B2B4",
        coingecko_id: Some("toshi"),
        reference_price: 0.0001,
    },
    TokenInfo {
        symbol: "DEGEN",
        name: "Degen",
        address: "0x4ed4E862860beD51a9570b96d89aF5E1B0Efefed",
        coingecko_id: Some("degen-base"),
        reference_price: 0.01,
    },
    TokenInfo {
        symbol: "BRETT",
        name: "Brett",
        address: "0x532f27101965dd16442E59d40670FaF5eBB142E4",
        coingecko_id: Some("based-brett"),
        reference_price: 0.08,
    },
    TokenInfo {
        symbol: "AERO",
        name: "Aerodrome",
        address: "0x940181a94A35A4569E4529A3CDfB74e38FD98631",
        coingecko_id: Some("aerodrome-finance"),
        reference_price: 0.9,
    },
    TokenInfo {
        symbol: "HIGHER",
        name: "Higher",
        address: "0x0578d8A44db98B23BF096A382e016e29a5Ce0ffe",
        coingecko_id: Some("higher"),
        reference_price: 0.02,
    },
];

/// Upstream access, kept behind a trait so tests can script prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Best pool snapshot from the DEX aggregator, already filtered to the
    /// target chain and minimum liquidity.
    async fn dex_snapshot(
        &self,
        token: &TokenInfo,
        network: &str,
        min_liquidity: f64,
    ) -> anyhow::Result<MarketSnapshot>;

    /// Generic spot-price fallback.
    async fn spot_snapshot(&self, token: &TokenInfo) -> anyhow::Result<MarketSnapshot>;
}

struct CacheEntry {
    snapshot: MarketSnapshot,
    fetched_at: Instant,
}

pub struct PriceFeed {
    source: Arc<dyn PriceSource>,
    network: String,
    cache_ttl: Duration,
    min_liquidity: f64,
    tokens: HashMap<String, TokenInfo>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    // Per-symbol fetch guard; concurrent cache misses collapse into one
    // upstream request.
    inflight: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PriceFeed {
    pub fn new(source: Arc<dyn PriceSource>, network: impl Into<String>, cache_ttl: Duration) -> Self {
        let tokens = SUPPORTED_TOKENS
            .iter()
            .map(|t| (t.symbol.to_string(), t.clone()))
            .collect();
        Self {
            source,
            network: network.into(),
            cache_ttl,
            min_liquidity: 10_000.0,
            tokens,
            cache: RwLock::new(HashMap::new()),
            inflight: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn is_allowed(&self, symbol: &str) -> bool {
        self.tokens.contains_key(&symbol.to_ascii_uppercase())
    }

    pub fn list_allowed(&self) -> Vec<TokenInfo> {
        let mut tokens: Vec<TokenInfo> = self.tokens.values().cloned().collect();
        tokens.sort_by(|a, b| a.symbol.cmp(b.symbol));
        tokens
    }

    /// Current snapshot for a whitelisted symbol. Unknown symbols fail with
    /// a validation error; every other failure degrades to stale-cache or
    /// mock data.
    pub async fn get_price(&self, symbol: &str) -> CoreResult<MarketSnapshot> {
        let symbol = symbol.to_ascii_uppercase();
        let token = self
            .tokens
            .get(&symbol)
            .cloned()
            .ok_or_else(|| CoreError::validation(format!("Symbol not supported: {symbol}")))?;

        if let Some(snapshot) = self.cached_fresh(&symbol) {
            return Ok(snapshot);
        }

        // Keyed lock; the cache re-check under it is what dedups the miss.
        let guard = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(symbol.clone()).or_default().clone()
        };
        let _fetching = guard.lock().await;

        if let Some(snapshot) = self.cached_fresh(&symbol) {
            return Ok(snapshot);
        }

        let snapshot = self.fetch(&token).await;
        self.cache.write().insert(
            symbol,
            CacheEntry {
                snapshot: snapshot.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(snapshot)
    }

    /// Whitelisted symbols ranked by 24h volume.
    pub async fn get_trending(&self, limit: usize) -> Vec<MarketSnapshot> {
        let mut snapshots = Vec::with_capacity(self.tokens.len());
        for symbol in self.tokens.keys() {
            if let Ok(snapshot) = self.get_price(symbol).await {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by(|a, b| {
            b.volume_24h
                .partial_cmp(&a.volume_24h)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        snapshots.truncate(limit);
        snapshots
    }

    fn cached_fresh(&self, symbol: &str) -> Option<MarketSnapshot> {
        let cache = self.cache.read();
        let entry = cache.get(symbol)?;
        (entry.fetched_at.elapsed() < self.cache_ttl).then(|| entry.snapshot.clone())
    }

    fn cached_any(&self, symbol: &str) -> Option<MarketSnapshot> {
        self.cache.read().get(symbol).map(|e| e.snapshot.clone())
    }

    async fn fetch(&self, token: &TokenInfo) -> MarketSnapshot {
        match self
            .source
            .dex_snapshot(token, &self.network, self.min_liquidity)
            .await
        {
            Ok(snapshot) => return snapshot,
            Err(e) => debug!(symbol = token.symbol, error = %e, "dex lookup failed"),
        }

        match self.source.spot_snapshot(token).await {
            Ok(snapshot) => return snapshot,
            Err(e) => warn!(symbol = token.symbol, error = %e, "spot fallback failed"),
        }

        if let Some(stale) = self.cached_any(token.symbol) {
            return stale;
        }

        mock_snapshot(token)
    }
}

/// Reference price perturbed within ±5%, tagged `mock`.
fn mock_snapshot(token: &TokenInfo) -> MarketSnapshot {
    let mut rng = rand::thread_rng();
    let drift = rng.gen_range(-0.05..0.05);
    let price = token.reference_price * (1.0 + drift);
    MarketSnapshot {
        symbol: token.symbol.to_string(),
        price,
        change_24h: rng.gen_range(-10.0..10.0),
        volume_24h: 250_000.0,
        liquidity: 500_000.0,
        market_cap: token.reference_price * 1e7,
        source: SnapshotSource::Mock,
        ts: crate::models::now_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DownSource;

    #[async_trait]
    impl PriceSource for DownSource {
        async fn dex_snapshot(
            &self,
            _: &TokenInfo,
            _: &str,
            _: f64,
        ) -> anyhow::Result<MarketSnapshot> {
            anyhow::bail!("dex offline")
        }
        async fn spot_snapshot(&self, _: &TokenInfo) -> anyhow::Result<MarketSnapshot> {
            anyhow::bail!("spot offline")
        }
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceSource for CountingSource {
        async fn dex_snapshot(
            &self,
            token: &TokenInfo,
            _: &str,
            _: f64,
        ) -> anyhow::Result<MarketSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(MarketSnapshot {
                symbol: token.symbol.to_string(),
                price: 3000.0,
                change_24h: 1.0,
                volume_24h: 1_000_000.0,
                liquidity: 2_000_000.0,
                market_cap: 3e11,
                source: SnapshotSource::Dex,
                ts: 0,
            })
        }
        async fn spot_snapshot(&self, _: &TokenInfo) -> anyhow::Result<MarketSnapshot> {
            anyhow::bail!("unused")
        }
    }

    #[tokio::test]
    async fn unknown_symbol_is_a_validation_error() {
        let feed = PriceFeed::new(Arc::new(DownSource), "base", Duration::from_secs(30));
        let err = feed.get_price("NOPE").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn total_outage_falls_back_to_mock_within_five_percent() {
        let feed = PriceFeed::new(Arc::new(DownSource), "base", Duration::from_secs(30));
        let snapshot = feed.get_price("eth").await.unwrap();
        assert_eq!(snapshot.source, SnapshotSource::Mock);
        assert!(snapshot.price > 0.0);
        assert!((snapshot.price - 3000.0).abs() <= 3000.0 * 0.05 + 1e-9);
    }

    #[tokio::test]
    async fn cache_serves_repeat_lookups() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let feed = PriceFeed::new(source.clone(), "base", Duration::from_secs(30));

        let first = feed.get_price("ETH").await.unwrap();
        let second = feed.get_price("ETH").await.unwrap();
        assert_eq!(first.price, second.price);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trending_ranks_by_volume() {
        let feed = PriceFeed::new(Arc::new(DownSource), "base", Duration::from_secs(30));
        let trending = feed.get_trending(3).await;
        assert_eq!(trending.len(), 3);
        assert!(trending[0].volume_24h >= trending[1].volume_24h);
    }
}
