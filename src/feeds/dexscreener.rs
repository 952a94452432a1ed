//! HTTP price sources: DexScreener pools first, CoinGecko spot as the
//! generic fallback.

use super::{MarketSnapshot, PriceSource, SnapshotSource, TokenInfo};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEX_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DexScreenerSource {
    http: reqwest::Client,
}

impl DexScreenerSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PriceSource for DexScreenerSource {
    async fn dex_snapshot(
        &self,
        token: &TokenInfo,
        network: &str,
        min_liquidity: f64,
    ) -> Result<MarketSnapshot> {
        let url = format!(
            "https://api.dexscreener.com/latest/dex/tokens/{}",
            token.address
        );
        let resp: DexTokenResponse = self
            .http
            .get(&url)
            .timeout(DEX_TIMEOUT)
            .send()
            .await
            .context("dexscreener request")?
            .error_for_status()?
            .json()
            .await
            .context("dexscreener json")?;

        // Highest-liquidity pool on the target chain wins.
        let best = resp
            .pairs
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.chain_id.eq_ignore_ascii_case(network))
            .filter(|p| p.liquidity.as_ref().map_or(0.0, |l| l.usd) >= min_liquidity)
            .max_by(|a, b| {
                let la = a.liquidity.as_ref().map_or(0.0, |l| l.usd);
                let lb = b.liquidity.as_ref().map_or(0.0, |l| l.usd);
                la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| anyhow!("no {network} pool above liquidity floor"))?;

        let price = best
            .price_usd
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| anyhow!("pool has no usable priceUsd"))?;

        Ok(MarketSnapshot {
            symbol: token.symbol.to_string(),
            price,
            change_24h: best.price_change.as_ref().map_or(0.0, |c| c.h24),
            volume_24h: best.volume.as_ref().map_or(0.0, |v| v.h24),
            liquidity: best.liquidity.as_ref().map_or(0.0, |l| l.usd),
            market_cap: best.fdv.unwrap_or(0.0),
            source: SnapshotSource::Dex,
            ts: crate::models::now_ms(),
        })
    }

    async fn spot_snapshot(&self, token: &TokenInfo) -> Result<MarketSnapshot> {
        let id = token
            .coingecko_id
            .ok_or_else(|| anyhow!("no spot id for {}", token.symbol))?;
        let url = format!(
            "https://api.coingecko.com/api/v3/simple/price?ids={id}&vs_currencies=usd&include_24hr_change=true&include_24hr_vol=true&include_market_cap=true"
        );
        let resp: serde_json::Value = self
            .http
            .get(&url)
            .timeout(DEX_TIMEOUT)
            .send()
            .await
            .context("coingecko request")?
            .error_for_status()?
            .json()
            .await
            .context("coingecko json")?;

        let entry = resp
            .get(id)
            .ok_or_else(|| anyhow!("coingecko returned no entry for {id}"))?;
        let price = entry
            .get("usd")
            .and_then(|v| v.as_f64())
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| anyhow!("coingecko entry has no usd price"))?;

        Ok(MarketSnapshot {
            symbol: token.symbol.to_string(),
            price,
            change_24h: entry
                .get("usd_24h_change")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            volume_24h: entry
                .get("usd_24h_vol")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            liquidity: 0.0,
            market_cap: entry
                .get("usd_market_cap")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            source: SnapshotSource::Spot,
            ts: crate::models::now_ms(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DexTokenResponse {
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    chain_id: String,
    price_usd: Option<String>,
    liquidity: Option<DexLiquidity>,
    volume: Option<DexWindow>,
    price_change: Option<DexWindow>,
    fdv: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexLiquidity {
    #[serde(default)]
    usd: f64,
}

#[derive(Debug, Deserialize)]
struct DexWindow {
    #[serde(default)]
    h24: f64,
}
