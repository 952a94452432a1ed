//! Strategy registry: registration, marketplace ranking, licensing.

use super::{License, ParsedStrategy, Strategy, StrategyOutcome, StrategyStats};
use crate::errors::{CoreError, CoreResult};
use crate::llm::LlmClient;
use crate::models::now_ms;
use crate::store::KvStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const STRATEGY_TTL: Duration = Duration::from_secs(365 * 24 * 3600);
const LICENSE_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
/// Cursor page size for marketplace scans.
const SCAN_PAGE: usize = 100;

fn strategy_key(id: u64) -> String {
    format!("strategy:{id}")
}

fn owner_key(wallet: &str) -> String {
    format!("user:strategies:{wallet}")
}

fn license_key(wallet: &str, round_id: &str) -> String {
    format!("license:{wallet}:{round_id}")
}

fn licenses_key(id: u64) -> String {
    format!("strategy:{id}:licenses")
}

pub struct StrategyRegistry {
    store: Arc<dyn KvStore>,
    llm: Arc<LlmClient>,
}

impl StrategyRegistry {
    pub fn new(store: Arc<dyn KvStore>, llm: Arc<LlmClient>) -> Self {
        Self { store, llm }
    }

    /// Register a strategy: assign the next id, parse the prose through the
    /// LLM, persist and index under the owner. Royalty must be in [5, 50].
    pub async fn register(
        &self,
        owner_wallet: &str,
        text: &str,
        royalty_percent: f64,
        name: &str,
        description: &str,
        tags: Vec<String>,
    ) -> CoreResult<Strategy> {
        if text.trim().is_empty() {
            return Err(CoreError::validation("Strategy text is required"));
        }
        if !(5.0..=50.0).contains(&royalty_percent) {
            return Err(CoreError::validation(
                "Royalty percent must be between 5 and 50",
            ));
        }

        let id = self.store.incr("strategy:counter").await? as u64;
        let parsed = self.llm.parse_strategy(text).await?;
        let now = now_ms();

        let strategy = Strategy {
            id,
            owner_wallet: owner_wallet.to_string(),
            name: if name.trim().is_empty() {
                format!("Strategy #{id}")
            } else {
                name.trim().to_string()
            },
            description: description.trim().to_string(),
            strategy_text: text.trim().to_string(),
            parsed,
            royalty_percent,
            stats: StrategyStats::default(),
            active: true,
            verified: false,
            tags,
            created_at: now,
            updated_at: now,
        };

        self.persist(&strategy).await?;
        self.store
            .sadd(&owner_key(owner_wallet), &id.to_string())
            .await?;

        info!(strategy_id = id, owner = owner_wallet, "strategy registered");
        Ok(strategy)
    }

    pub async fn get(&self, id: u64) -> CoreResult<Strategy> {
        let raw = self
            .store
            .get(&strategy_key(id))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("Strategy {id}")))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn parsed_for(&self, id: u64) -> CoreResult<ParsedStrategy> {
        Ok(self.get(id).await?.parsed)
    }

    pub async fn list_by_owner(&self, owner_wallet: &str) -> CoreResult<Vec<Strategy>> {
        let ids = self.store.smembers(&owner_key(owner_wallet)).await?;
        let mut strategies = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(id) = id.parse::<u64>() else { continue };
            match self.get(id).await {
                Ok(s) => strategies.push(s),
                Err(CoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        strategies.sort_by_key(|s| std::cmp::Reverse(s.created_at));
        Ok(strategies)
    }

    /// Marketplace ranking: active and verified strategies ordered by
    /// `win_rate × total_uses` descending.
    pub async fn list_top(&self, limit: usize) -> CoreResult<Vec<Strategy>> {
        let mut out = self
            .scan(|s| s.active && s.verified)
            .await?;
        out.sort_by(|a, b| {
            b.ranking_score()
                .partial_cmp(&a.ranking_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out.truncate(limit);
        Ok(out)
    }

    /// Case-insensitive substring match over name, description, and tags
    /// of active strategies.
    pub async fn search(&self, query: &str, limit: usize) -> CoreResult<Vec<Strategy>> {
        let needle = query.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = self
            .scan(|s| {
                s.active
                    && (s.name.to_ascii_lowercase().contains(&needle)
                        || s.description.to_ascii_lowercase().contains(&needle)
                        || s.tags.iter().any(|t| t.to_ascii_lowercase().contains(&needle)))
            })
            .await?;
        out.sort_by(|a, b| {
            b.ranking_score()
                .partial_cmp(&a.ranking_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out.truncate(limit);
        Ok(out)
    }

    /// Fold a round outcome into the strategy's aggregate stats.
    pub async fn update_stats(&self, id: u64, outcome: StrategyOutcome) -> CoreResult<()> {
        let mut strategy = self.get(id).await?;
        let stats = &mut strategy.stats;

        let prior_uses = stats.total_uses as f64;
        stats.total_uses += 1;
        stats.total_trades += outcome.trades;
        stats.successful_trades += outcome.wins;
        stats.total_earnings += outcome.earnings;
        stats.win_rate = if stats.total_trades > 0 {
            stats.successful_trades as f64 / stats.total_trades as f64 * 100.0
        } else {
            0.0
        };
        stats.average_return =
            (stats.average_return * prior_uses + outcome.return_percent) / stats.total_uses as f64;
        if outcome.return_percent > stats.best_performance {
            stats.best_performance = outcome.return_percent;
        }
        strategy.updated_at = now_ms();

        self.persist(&strategy).await
    }

    /// Issue a per-round license. The strategy must be active, the licensee
    /// must not be the owner, and a wallet gets at most one license per
    /// round. The royalty percent is captured at issuance.
    pub async fn license(
        &self,
        licensee_wallet: &str,
        strategy_id: u64,
        round_id: &str,
    ) -> CoreResult<License> {
        let strategy = self.get(strategy_id).await?;
        if !strategy.active {
            return Err(CoreError::validation("Strategy is not active"));
        }
        if strategy.owner_wallet.eq_ignore_ascii_case(licensee_wallet) {
            return Err(CoreError::validation("Cannot license your own strategy"));
        }
        if self
            .store
            .exists(&license_key(licensee_wallet, round_id))
            .await?
        {
            return Err(CoreError::conflict(
                "Already licensed a strategy for this round",
            ));
        }

        let license = License {
            licensee_wallet: licensee_wallet.to_string(),
            strategy_id,
            round_id: round_id.to_string(),
            strategy_owner: strategy.owner_wallet.clone(),
            royalty_percent: strategy.royalty_percent,
            profit_shared: 0.0,
            active: true,
            created_at: now_ms(),
        };

        self.store
            .set_ex(
                &license_key(licensee_wallet, round_id),
                &serde_json::to_string(&license)?,
                LICENSE_TTL,
            )
            .await?;
        self.store
            .sadd(&licenses_key(strategy_id), licensee_wallet)
            .await?;

        info!(
            strategy_id,
            licensee = licensee_wallet,
            round_id,
            royalty = license.royalty_percent,
            "strategy licensed"
        );
        Ok(license)
    }

    pub async fn get_license(
        &self,
        licensee_wallet: &str,
        round_id: &str,
    ) -> CoreResult<Option<License>> {
        let raw = self
            .store
            .get(&license_key(licensee_wallet, round_id))
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Credit a licensee's shared profit to the license record and the
    /// source strategy's earnings. Off-chain model only.
    pub async fn record_royalty(
        &self,
        licensee_wallet: &str,
        round_id: &str,
        amount: f64,
    ) -> CoreResult<()> {
        let Some(mut license) = self.get_license(licensee_wallet, round_id).await? else {
            return Ok(());
        };
        license.profit_shared += amount;
        self.store
            .set_ex(
                &license_key(licensee_wallet, round_id),
                &serde_json::to_string(&license)?,
                LICENSE_TTL,
            )
            .await?;

        match self.get(license.strategy_id).await {
            Ok(mut strategy) => {
                strategy.stats.total_earnings += amount;
                strategy.updated_at = now_ms();
                self.persist(&strategy).await?;
            }
            Err(CoreError::NotFound(_)) => {
                warn!(strategy_id = license.strategy_id, "royalty for expired strategy");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Owner-only active toggle.
    pub async fn set_status(&self, id: u64, owner_wallet: &str, active: bool) -> CoreResult<Strategy> {
        let mut strategy = self.get(id).await?;
        if !strategy.owner_wallet.eq_ignore_ascii_case(owner_wallet) {
            return Err(CoreError::validation("Not the strategy owner"));
        }
        strategy.active = active;
        strategy.updated_at = now_ms();
        self.persist(&strategy).await?;
        Ok(strategy)
    }

    /// Admin verification toggle.
    pub async fn set_verified(&self, id: u64, verified: bool) -> CoreResult<Strategy> {
        let mut strategy = self.get(id).await?;
        strategy.verified = verified;
        strategy.updated_at = now_ms();
        self.persist(&strategy).await?;
        Ok(strategy)
    }

    async fn persist(&self, strategy: &Strategy) -> CoreResult<()> {
        self.store
            .set_ex(
                &strategy_key(strategy.id),
                &serde_json::to_string(strategy)?,
                STRATEGY_TTL,
            )
            .await
    }

    /// Scan the strategy keyspace in pages, loading and filtering records.
    async fn scan(&self, keep: impl Fn(&Strategy) -> bool) -> CoreResult<Vec<Strategy>> {
        let keys = self.store.keys("strategy:*").await?;
        let mut ids: Vec<u64> = keys
            .iter()
            .filter_map(|k| k.strip_prefix("strategy:"))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .collect();
        ids.sort_unstable();

        let mut out = Vec::new();
        for page in ids.chunks(SCAN_PAGE) {
            for &id in page {
                match self.get(id).await {
                    Ok(s) if keep(&s) => out.push(s),
                    Ok(_) => {}
                    Err(CoreError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatApi, ChatError, LlmClient, LlmClientConfig};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration as StdDuration;

    struct StubChat;

    #[async_trait]
    impl ChatApi for StubChat {
        async fn chat(&self, _: &str, _: &str, _: u32, _: f64) -> Result<String, ChatError> {
            Ok(r#"{"strategy_type":"technical","assets":["ETH"],"clarity_score":8}"#.into())
        }
    }

    fn registry() -> StrategyRegistry {
        let llm = LlmClient::spawn(
            Arc::new(StubChat),
            LlmClientConfig {
                min_interval: StdDuration::from_millis(1),
                post_delay: StdDuration::from_millis(0),
                backoff: StdDuration::from_millis(1),
                max_rate_limit_retries: 1,
            },
        );
        StrategyRegistry::new(Arc::new(MemoryStore::new()), llm)
    }

    #[tokio::test]
    async fn register_assigns_monotonic_ids() {
        let reg = registry();
        let a = reg
            .register("0xw1", "Buy ETH dips", 10.0, "Dips", "", vec![])
            .await
            .unwrap();
        let b = reg
            .register("0xw1", "Sell TOSHI rips", 10.0, "Rips", "", vec![])
            .await
            .unwrap();
        assert_eq!(a.id + 1, b.id);
        assert_eq!(reg.list_by_owner("0xw1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn royalty_bounds_are_enforced() {
        let reg = registry();
        for royalty in [4.9, 50.1, -1.0] {
            let err = reg
                .register("0xw1", "Buy ETH", royalty, "", "", vec![])
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn self_license_is_rejected() {
        let reg = registry();
        let s = reg
            .register("0xw1", "Buy ETH", 10.0, "", "", vec![])
            .await
            .unwrap();
        let err = reg.license("0xW1", s.id, "r1").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn second_license_for_same_round_conflicts() {
        let reg = registry();
        let s = reg
            .register("0xw1", "Buy ETH", 15.0, "", "", vec![])
            .await
            .unwrap();
        reg.license("0xw2", s.id, "r1").await.unwrap();
        let err = reg.license("0xw2", s.id, "r1").await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        // A different round is fine.
        reg.license("0xw2", s.id, "r2").await.unwrap();
    }

    #[tokio::test]
    async fn license_captures_royalty_at_issuance() {
        let reg = registry();
        let s = reg
            .register("0xw1", "Buy ETH", 25.0, "", "", vec![])
            .await
            .unwrap();
        let license = reg.license("0xw2", s.id, "r1").await.unwrap();
        assert_eq!(license.royalty_percent, 25.0);
        assert_eq!(license.strategy_owner, "0xw1");
    }

    #[tokio::test]
    async fn marketplace_ranks_by_win_rate_times_uses() {
        let reg = registry();
        let a = reg
            .register("0xw1", "Buy ETH", 10.0, "A", "", vec![])
            .await
            .unwrap();
        let b = reg
            .register("0xw2", "Buy TOSHI", 10.0, "B", "", vec![])
            .await
            .unwrap();
        reg.set_verified(a.id, true).await.unwrap();
        reg.set_verified(b.id, true).await.unwrap();

        // a: one use, 50% win rate. b: two uses, 100% win rate.
        reg.update_stats(
            a.id,
            StrategyOutcome {
                trades: 2,
                wins: 1,
                return_percent: 1.0,
                earnings: 0.0,
            },
        )
        .await
        .unwrap();
        for _ in 0..2 {
            reg.update_stats(
                b.id,
                StrategyOutcome {
                    trades: 1,
                    wins: 1,
                    return_percent: 2.0,
                    earnings: 0.0,
                },
            )
            .await
            .unwrap();
        }

        let top = reg.list_top(10).await.unwrap();
        assert_eq!(top[0].id, b.id);
        assert_eq!(top[1].id, a.id);
    }

    #[tokio::test]
    async fn unverified_strategies_stay_out_of_marketplace() {
        let reg = registry();
        reg.register("0xw1", "Buy ETH", 10.0, "A", "", vec![])
            .await
            .unwrap();
        assert!(reg.list_top(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_stats_tracks_best_performance_monotonically() {
        let reg = registry();
        let s = reg
            .register("0xw1", "Buy ETH", 10.0, "", "", vec![])
            .await
            .unwrap();
        for pct in [3.0, 7.0, 2.0] {
            reg.update_stats(
                s.id,
                StrategyOutcome {
                    trades: 1,
                    wins: 1,
                    return_percent: pct,
                    earnings: 0.0,
                },
            )
            .await
            .unwrap();
        }
        let s = reg.get(s.id).await.unwrap();
        assert_eq!(s.stats.best_performance, 7.0);
        assert_eq!(s.stats.total_uses, 3);
    }

    #[tokio::test]
    async fn status_toggle_requires_owner() {
        let reg = registry();
        let s = reg
            .register("0xw1", "Buy ETH", 10.0, "", "", vec![])
            .await
            .unwrap();
        let err = reg.set_status(s.id, "0xw2", false).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        reg.set_status(s.id, "0xw1", false).await.unwrap();
        assert!(!reg.get(s.id).await.unwrap().active);
    }
}
