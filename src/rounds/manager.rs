//! Round orchestration: lifecycle state machine, participant admission,
//! leaderboard maintenance, event emission.
//!
//! State mutations happen under a per-round mutex, after any I/O returns;
//! joins are therefore serialized per round and `total_participants` is
//! linearizable. The periodic execution task lives in `executor.rs`.

use super::{
    leaderboard_key, logs_key, participant_key, participants_key, profit_grade, round_key,
    round_number_key, EnhancedLeaderboardEntry, LeaderboardEntry, Participant, Round,
    RoundSettings, RoundStats, RoundStatus, StrategyBinding, TradeLogEntry, ROUNDS_ACTIVE,
    ROUNDS_FINISHED, ROUNDS_RUNNING, ROUND_COUNTER,
};
use crate::errors::{CoreError, CoreResult};
use crate::events::{EventBus, PushEvent};
use crate::feeds::PriceFeed;
use crate::llm::LlmClient;
use crate::models::now_ms;
use crate::portfolio::Portfolio;
use crate::store::KvStore;
use crate::strategy::{StrategyOutcome, StrategyRegistry};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Delay between a round filling up and its automatic start.
const AUTO_START_DELAY: Duration = Duration::from_secs(5);
/// Entries carried on a leaderboard push.
const PUSH_TOP_N: usize = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRound {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Seconds; stored as milliseconds on the round.
    pub duration: u64,
    pub starting_balance: Option<f64>,
    pub min_participants: Option<u32>,
    pub max_participants: Option<u32>,
    /// Seconds between execution ticks.
    pub execution_interval: Option<u64>,
    pub allowed_tokens: Option<Vec<String>>,
    pub auto_start: Option<bool>,
    pub expected_profit_percent: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub wallet_address: String,
    pub username: Option<String>,
    /// Inline strategy prose.
    pub strategy: Option<String>,
    /// A registered strategy owned by the joiner.
    pub strategy_id: Option<u64>,
    /// Another wallet's registered strategy, licensed for this round.
    pub license_strategy_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanJoin {
    pub can_join: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct RoundManager {
    store: Arc<dyn KvStore>,
    feed: Arc<PriceFeed>,
    llm: Arc<LlmClient>,
    registry: Arc<StrategyRegistry>,
    bus: EventBus,
    // Per-round mutex guarding the round record, its participant set, and
    // its leaderboard.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    tasks: SyncMutex<HashMap<String, JoinHandle<()>>>,
    autostart_armed: SyncMutex<HashSet<String>>,
}

impl RoundManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        feed: Arc<PriceFeed>,
        llm: Arc<LlmClient>,
        registry: Arc<StrategyRegistry>,
        bus: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            feed,
            llm,
            registry,
            bus,
            locks: Mutex::new(HashMap::new()),
            tasks: SyncMutex::new(HashMap::new()),
            autostart_armed: SyncMutex::new(HashSet::new()),
        })
    }

    pub(super) fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub(super) fn feed(&self) -> &Arc<PriceFeed> {
        &self.feed
    }

    pub(super) fn llm(&self) -> &Arc<LlmClient> {
        &self.llm
    }

    pub(super) fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    pub(super) fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Drop a finished executor's handle; no-op when the admin path
    /// already claimed it.
    pub(super) fn clear_task(&self, round_id: &str) {
        self.tasks.lock().remove(round_id);
    }

    async fn round_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    pub async fn create_round(&self, cfg: CreateRound) -> CoreResult<Round> {
        if cfg.duration == 0 {
            return Err(CoreError::validation("Duration must be positive"));
        }
        let starting_balance = cfg.starting_balance.unwrap_or(10_000.0);
        if starting_balance <= 0.0 {
            return Err(CoreError::validation("Starting balance must be positive"));
        }
        let min_participants = cfg.min_participants.unwrap_or(2).max(1);
        let max_participants = cfg.max_participants.unwrap_or(10);
        if max_participants < min_participants {
            return Err(CoreError::validation(
                "Max participants below min participants",
            ));
        }

        let defaults = RoundSettings::default();
        let allowed_symbols: Vec<String> = cfg
            .allowed_tokens
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(unknown) = allowed_symbols.iter().find(|s| !self.feed.is_allowed(s)) {
            return Err(CoreError::validation(format!(
                "Symbol not supported: {unknown}"
            )));
        }

        let number = self.store.incr(ROUND_COUNTER).await? as u64;
        let round = Round {
            id: Uuid::new_v4().to_string(),
            number,
            title: cfg
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| format!("Trading Round #{number}")),
            description: cfg.description.unwrap_or_default(),
            duration_ms: cfg.duration * 1000,
            starting_balance,
            min_participants,
            max_participants,
            settings: RoundSettings {
                execution_interval_ms: cfg
                    .execution_interval
                    .map(|s| s * 1000)
                    .filter(|ms| *ms >= 1000)
                    .unwrap_or(defaults.execution_interval_ms),
                allowed_symbols,
                auto_start: cfg.auto_start.unwrap_or(defaults.auto_start),
                expected_profit_percent: cfg
                    .expected_profit_percent
                    .filter(|p| *p > 0.0)
                    .unwrap_or(defaults.expected_profit_percent),
                ..defaults
            },
            status: RoundStatus::Waiting,
            created_at: now_ms(),
            start_at: None,
            end_at: None,
            stats: RoundStats::default(),
        };

        self.save_round(&round).await?;
        self.store
            .set_ex(&round_number_key(number), &round.id, round.ttl())
            .await?;
        self.store.sadd(ROUNDS_ACTIVE, &round.id).await?;

        info!(round_id = %round.id, number, "round created");
        self.bus.publish(PushEvent::RoundCreated {
            round_id: round.id.clone(),
            round_number: number,
            title: round.title.clone(),
        });
        Ok(round)
    }

    /// Admit a participant. Exactly one of {inline strategy, owned
    /// strategyId, licensed strategyId} must be present.
    pub async fn join_round(
        self: &Arc<Self>,
        round_id: &str,
        req: JoinRequest,
    ) -> CoreResult<Participant> {
        let wallet = req.wallet_address.trim().to_ascii_lowercase();
        if wallet.is_empty() {
            return Err(CoreError::validation("Wallet address is required"));
        }

        let inline_text = req
            .strategy
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let sources = [
            inline_text.is_some(),
            req.strategy_id.is_some(),
            req.license_strategy_id.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if sources != 1 {
            return Err(CoreError::validation(
                "Provide exactly one of strategy, strategyId, or licenseStrategyId",
            ));
        }

        let lock = self.round_lock(round_id).await;
        let _guard = lock.lock().await;

        let mut round = self.load_round(round_id).await?;
        if round.status != RoundStatus::Waiting {
            return Err(CoreError::conflict("Round is not accepting participants"));
        }
        if self
            .store
            .sismember(&participants_key(round_id), &wallet)
            .await?
        {
            return Err(CoreError::conflict("Already joined this round"));
        }
        let current = self.store.scard(&participants_key(round_id)).await? as u32;
        if current >= round.max_participants {
            return Err(CoreError::conflict("Round is full"));
        }

        let binding = match (inline_text, req.strategy_id, req.license_strategy_id) {
            (Some(text), _, _) => StrategyBinding::Inline {
                parsed: self.llm.parse_strategy(text).await?,
            },
            (_, Some(id), _) => {
                let strategy = self.registry.get(id).await?;
                if !strategy.owner_wallet.eq_ignore_ascii_case(&wallet) {
                    return Err(CoreError::validation("Not the strategy owner"));
                }
                StrategyBinding::Owned {
                    strategy_id: id,
                    parsed: strategy.parsed,
                }
            }
            (_, _, Some(id)) => {
                let license = self.registry.license(&wallet, id, round_id).await?;
                let strategy = self.registry.get(id).await?;
                StrategyBinding::Licensed {
                    strategy_id: id,
                    licensor_wallet: license.strategy_owner,
                    royalty_percent: license.royalty_percent,
                    parsed: strategy.parsed,
                }
            }
            (None, None, None) => unreachable!("binding source validated above"),
        };

        let participant = Participant {
            round_id: round_id.to_string(),
            wallet_address: wallet.clone(),
            username: req
                .username
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| short_wallet(&wallet)),
            binding,
            portfolio: Portfolio::new(round.starting_balance),
            joined_at: now_ms(),
            active: true,
        };

        self.save_participant(&round, &participant).await?;
        self.store.sadd(&participants_key(round_id), &wallet).await?;
        let total = self.store.scard(&participants_key(round_id)).await? as u32;
        round.stats.total_participants = total;
        self.save_round(&round).await?;

        info!(round_id, wallet = %wallet, total, "participant joined");
        self.bus.publish(PushEvent::ParticipantJoined {
            round_id: round_id.to_string(),
            wallet_address: wallet,
            username: participant.username.clone(),
            total_participants: total,
        });

        if total >= round.max_participants && round.settings.auto_start {
            self.arm_autostart(round_id);
        }

        Ok(participant)
    }

    /// Arm the auto-start timer; fires at most once per round.
    fn arm_autostart(self: &Arc<Self>, round_id: &str) {
        if !self.autostart_armed.lock().insert(round_id.to_string()) {
            return;
        }
        info!(round_id, "round full; auto-start armed");
        let mgr = self.clone();
        let round_id = round_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(AUTO_START_DELAY).await;
            match mgr.start_round(&round_id).await {
                Ok(_) => {}
                Err(CoreError::Conflict(_)) => {} // already started or cancelled
                Err(e) => warn!(%round_id, error = %e, "auto-start failed"),
            }
        });
    }

    pub async fn start_round(self: &Arc<Self>, round_id: &str) -> CoreResult<Round> {
        let lock = self.round_lock(round_id).await;
        let round = {
            let _guard = lock.lock().await;

            let mut round = self.load_round(round_id).await?;
            if round.status != RoundStatus::Waiting {
                return Err(CoreError::conflict("Round is not in waiting state"));
            }
            let participants = self.store.scard(&participants_key(round_id)).await? as u32;
            if participants < round.min_participants {
                return Err(CoreError::validation("Not enough participants to start"));
            }

            let now = now_ms();
            round.status = RoundStatus::Active;
            round.start_at = Some(now);
            round.end_at = Some(now + round.duration_ms as i64);
            self.save_round(&round).await?;
            self.store.srem(ROUNDS_ACTIVE, round_id).await?;
            self.store.sadd(ROUNDS_RUNNING, round_id).await?;
            round
        };

        info!(round_id, end_at = round.end_at, "round started");
        self.bus.publish(PushEvent::RoundStarted {
            round_id: round_id.to_string(),
            end_at: round.end_at.unwrap_or_default(),
        });

        let handle = super::executor::spawn(self.clone(), round_id.to_string());
        self.tasks.lock().insert(round_id.to_string(), handle);
        Ok(round)
    }

    /// Admin end: finalize, then cancel the periodic task. In-flight LLM
    /// calls complete inside the queue worker either way.
    pub async fn end_round(self: &Arc<Self>, round_id: &str) -> CoreResult<Round> {
        let handle = self.tasks.lock().remove(round_id);
        match self.finalize_round(round_id).await {
            Ok(round) => {
                if let Some(handle) = handle {
                    handle.abort();
                }
                Ok(round)
            }
            Err(e) => {
                if let Some(handle) = handle {
                    self.tasks.lock().insert(round_id.to_string(), handle);
                }
                Err(e)
            }
        }
    }

    /// Cancel before start. Terminal.
    pub async fn cancel_round(&self, round_id: &str) -> CoreResult<Round> {
        let lock = self.round_lock(round_id).await;
        let _guard = lock.lock().await;

        let mut round = self.load_round(round_id).await?;
        if round.status != RoundStatus::Waiting {
            return Err(CoreError::conflict("Only waiting rounds can be cancelled"));
        }
        round.status = RoundStatus::Cancelled;
        self.save_round(&round).await?;
        self.store.srem(ROUNDS_ACTIVE, round_id).await?;
        info!(round_id, "round cancelled");
        Ok(round)
    }

    /// Shared terminal transition: deadline path (executor) and admin path
    /// both come through here. Runs a final revaluation and leaderboard
    /// build, moves the round between status sets, feeds stats back into
    /// the registry, and emits `round_ended`.
    pub(super) async fn finalize_round(self: &Arc<Self>, round_id: &str) -> CoreResult<Round> {
        let round = {
            let lock = self.round_lock(round_id).await;
            let _guard = lock.lock().await;

            let mut round = self.load_round(round_id).await?;
            if round.status != RoundStatus::Active {
                return Err(CoreError::conflict("Round is not active"));
            }
            round.status = RoundStatus::Finished;
            round.end_at = Some(round.end_at.map_or(now_ms(), |e| e.min(now_ms())));
            round.stats.total_trades = self.sum_trades(round_id).await;
            self.save_round(&round).await?;
            self.store.srem(ROUNDS_RUNNING, round_id).await?;
            self.store.sadd(ROUNDS_FINISHED, round_id).await?;
            round
        };

        self.autostart_armed.lock().remove(round_id);

        self.revalue_all(&round).await;
        let entries = self
            .rebuild_leaderboard(&round)
            .await
            .unwrap_or_default();
        self.feed_stats_back(&round).await;

        let winner = entries.first().map(|e| e.wallet_address.clone());
        info!(round_id, winner = winner.as_deref().unwrap_or("-"), "round ended");
        self.bus.publish(PushEvent::RoundEnded {
            round_id: round_id.to_string(),
            winner,
        });
        Ok(round)
    }

    pub async fn get_round(&self, round_id: &str) -> CoreResult<Round> {
        self.load_round(round_id).await
    }

    pub async fn current_participants(&self, round_id: &str) -> CoreResult<u32> {
        Ok(self.store.scard(&participants_key(round_id)).await? as u32)
    }

    pub async fn list_rounds(&self, status: &str, limit: usize) -> CoreResult<Vec<Round>> {
        let set = match status {
            "active" => ROUNDS_ACTIVE,
            "running" => ROUNDS_RUNNING,
            "finished" => ROUNDS_FINISHED,
            other => {
                return Err(CoreError::validation(format!(
                    "Unknown round status filter: {other}"
                )))
            }
        };

        let ids = self.store.smembers(set).await?;
        let mut rounds = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load_round(&id).await {
                Ok(round) => rounds.push(round),
                Err(CoreError::NotFound(_)) => {} // expired under TTL
                Err(e) => return Err(e),
            }
        }
        rounds.sort_by_key(|r| std::cmp::Reverse(r.number));
        rounds.truncate(limit);
        Ok(rounds)
    }

    pub async fn can_join(&self, round_id: &str, wallet: &str) -> CoreResult<CanJoin> {
        let wallet = wallet.trim().to_ascii_lowercase();
        let round = match self.load_round(round_id).await {
            Ok(round) => round,
            Err(CoreError::NotFound(_)) => {
                return Ok(CanJoin {
                    can_join: false,
                    reason: Some("Round not found".into()),
                })
            }
            Err(e) => return Err(e),
        };

        let reason = if round.status != RoundStatus::Waiting {
            Some("Round is not accepting participants".to_string())
        } else if self
            .store
            .sismember(&participants_key(round_id), &wallet)
            .await?
        {
            Some("Already joined this round".to_string())
        } else if self.store.scard(&participants_key(round_id)).await? as u32
            >= round.max_participants
        {
            Some("Round is full".to_string())
        } else {
            None
        };

        Ok(CanJoin {
            can_join: reason.is_none(),
            reason,
        })
    }

    pub async fn participant(&self, round_id: &str, wallet: &str) -> CoreResult<Participant> {
        let wallet = wallet.trim().to_ascii_lowercase();
        let raw = self
            .store
            .get(&participant_key(round_id, &wallet))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("Participant {wallet}")))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn participants(&self, round_id: &str) -> CoreResult<Vec<Participant>> {
        let wallets = self.store.smembers(&participants_key(round_id)).await?;
        let mut out = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            match self.participant(round_id, &wallet).await {
                Ok(p) => out.push(p),
                Err(CoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        out.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(out)
    }

    /// Trade log, most recent first.
    pub async fn participant_logs(
        &self,
        round_id: &str,
        wallet: &str,
        limit: usize,
    ) -> CoreResult<Vec<TradeLogEntry>> {
        let wallet = wallet.trim().to_ascii_lowercase();
        let rows = self.store.hget_all(&logs_key(round_id, &wallet)).await?;
        let mut entries: Vec<TradeLogEntry> = rows
            .iter()
            .filter_map(|(_, v)| serde_json::from_str(v).ok())
            .collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.ts));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Ranked leaderboard from the persisted sorted set.
    pub async fn leaderboard(
        &self,
        round_id: &str,
        limit: usize,
    ) -> CoreResult<Vec<LeaderboardEntry>> {
        let stop = if limit == 0 { -1 } else { limit as isize - 1 };
        let ranked = self
            .store
            .zrevrange_withscores(&leaderboard_key(round_id), 0, stop)
            .await?;

        let mut entries = Vec::with_capacity(ranked.len());
        for (wallet, score) in ranked {
            // Missing participant records leave a hole in the set; keep
            // rank numbering contiguous over what loads.
            let Ok(participant) = self.participant(round_id, &wallet).await else {
                continue;
            };
            let pf = &participant.portfolio;
            entries.push(LeaderboardEntry {
                rank: entries.len() as u32 + 1,
                wallet_address: participant.wallet_address.clone(),
                username: participant.username.clone(),
                pnl: pf.total_value - pf.starting_balance,
                pnl_percentage: score,
                total_value: pf.total_value,
                trades: pf.trades,
                win_rate: pf.win_rate,
            });
        }
        Ok(entries)
    }

    pub async fn enhanced_leaderboard(
        &self,
        round_id: &str,
        limit: usize,
    ) -> CoreResult<Vec<EnhancedLeaderboardEntry>> {
        let round = self.load_round(round_id).await?;
        let expected = round.settings.expected_profit_percent.max(f64::EPSILON);
        Ok(self
            .leaderboard(round_id, limit)
            .await?
            .into_iter()
            .map(|entry| {
                let profit_score = entry.pnl_percentage / expected;
                EnhancedLeaderboardEntry {
                    grade: profit_grade(profit_score),
                    profit_score,
                    entry,
                }
            })
            .collect())
    }

    /// Delete and rebuild the round's sorted set from current portfolios,
    /// returning the push-sized top slice. Tolerates missing participants.
    pub(super) async fn rebuild_leaderboard(
        &self,
        round: &Round,
    ) -> CoreResult<Vec<LeaderboardEntry>> {
        let key = leaderboard_key(&round.id);
        self.store.del(&key).await?;
        for wallet in self.store.smembers(&participants_key(&round.id)).await? {
            match self.participant(&round.id, &wallet).await {
                Ok(p) => {
                    self.store
                        .zadd(&key, p.portfolio.pnl_percent, &p.wallet_address)
                        .await?;
                }
                Err(CoreError::NotFound(_)) => {}
                Err(e) => warn!(round_id = %round.id, %wallet, error = %e, "leaderboard entry skipped"),
            }
        }
        self.leaderboard(&round.id, PUSH_TOP_N).await
    }

    /// Revalue every participant at current prices and persist. Per-wallet
    /// failures log and continue.
    pub(super) async fn revalue_all(self: &Arc<Self>, round: &Round) {
        let wallets = self
            .store
            .smembers(&participants_key(&round.id))
            .await
            .unwrap_or_default();
        for wallet in wallets {
            let Ok(mut participant) = self.participant(&round.id, &wallet).await else {
                continue;
            };
            let mut prices = HashMap::new();
            for symbol in participant.portfolio.positions.keys().cloned().collect::<Vec<_>>() {
                if let Ok(snapshot) = self.feed.get_price(&symbol).await {
                    prices.insert(symbol, snapshot.price);
                }
            }
            participant.portfolio.revalue(&prices);
            if let Err(e) = self.save_participant(round, &participant).await {
                warn!(round_id = %round.id, %wallet, error = %e, "final revaluation not persisted");
            }
        }
    }

    /// Push each participant's round outcome into the registry stats for
    /// owned and licensed strategies.
    async fn feed_stats_back(&self, round: &Round) {
        let Ok(participants) = self.participants(&round.id).await else {
            return;
        };
        for participant in participants {
            let Some(strategy_id) = participant.binding.strategy_id() else {
                continue;
            };
            let pf = &participant.portfolio;
            let outcome = StrategyOutcome {
                trades: pf.trades,
                wins: pf.wins,
                return_percent: pf.pnl_percent,
                earnings: 0.0,
            };
            if let Err(e) = self.registry.update_stats(strategy_id, outcome).await {
                warn!(strategy_id, error = %e, "strategy stats update failed");
            }
        }
    }

    async fn sum_trades(&self, round_id: &str) -> u64 {
        let Ok(participants) = self.participants(round_id).await else {
            return 0;
        };
        participants.iter().map(|p| p.portfolio.trades).sum()
    }

    pub(super) async fn load_round(&self, round_id: &str) -> CoreResult<Round> {
        let raw = self
            .store
            .get(&round_key(round_id))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("Round {round_id}")))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub(super) async fn save_round(&self, round: &Round) -> CoreResult<()> {
        self.store
            .set_ex(&round_key(&round.id), &serde_json::to_string(round)?, round.ttl())
            .await
    }

    pub(super) async fn save_participant(
        &self,
        round: &Round,
        participant: &Participant,
    ) -> CoreResult<()> {
        self.store
            .set_ex(
                &participant_key(&round.id, &participant.wallet_address),
                &serde_json::to_string(participant)?,
                round.ttl(),
            )
            .await
    }

    /// Respawn executors for rounds that were running when the process
    /// stopped.
    pub async fn resume_running_rounds(self: &Arc<Self>) {
        let ids = self.store.smembers(ROUNDS_RUNNING).await.unwrap_or_default();
        for id in ids {
            match self.load_round(&id).await {
                Ok(round) if round.status == RoundStatus::Active => {
                    info!(round_id = %id, "resuming round executor");
                    let handle = super::executor::spawn(self.clone(), id.clone());
                    self.tasks.lock().insert(id, handle);
                }
                Ok(_) | Err(CoreError::NotFound(_)) => {
                    let _ = self.store.srem(ROUNDS_RUNNING, &id).await;
                }
                Err(e) => warn!(round_id = %id, error = %e, "resume skipped"),
            }
        }
    }
}

fn short_wallet(wallet: &str) -> String {
    if wallet.len() > 10 {
        format!("{}…{}", &wallet[..6], &wallet[wallet.len() - 4..])
    } else {
        wallet.to_string()
    }
}
