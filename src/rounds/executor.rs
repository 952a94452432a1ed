//! Per-round periodic execution task.
//!
//! One long-lived task per active round. Fixed-delay scheduling: each tick
//! runs to completion before the next interval sleep starts, so in-flight
//! work stays bounded no matter how slow the LLM is. Within a tick the
//! fan-out across participants is parallel but bounded; within one
//! participant the symbol loop is strictly sequential (price, signal,
//! trade, log). Failures are isolated per participant and per symbol.

use super::{logs_key, LeaderboardEntry, Round, RoundStatus, TradeLogEntry};
use super::manager::RoundManager;
use crate::errors::CoreResult;
use crate::events::PushEvent;
use crate::llm::SignalAction;
use crate::models::now_ms;
use crate::portfolio::TradePolicy;
use crate::rounds::StrategyBinding;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Upper bound on concurrently executing participants per tick.
const MAX_TICK_CONCURRENCY: usize = 10;
/// Symbols considered per participant per tick.
const MAX_SYMBOLS_PER_TICK: usize = 3;

pub(super) fn spawn(mgr: Arc<RoundManager>, round_id: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(%round_id, "round executor started");
        run_round_loop(mgr.clone(), &round_id).await;
        mgr.clear_task(&round_id);
        info!(%round_id, "round executor stopped");
    })
}

async fn run_round_loop(mgr: Arc<RoundManager>, round_id: &str) {
    loop {
        let round = match mgr.load_round(round_id).await {
            Ok(round) => round,
            Err(e) => {
                warn!(round_id, error = %e, "executor lost its round record");
                return;
            }
        };
        if round.status != RoundStatus::Active {
            return;
        }

        if round.end_at.is_some_and(|end| now_ms() >= end) {
            if let Err(e) = mgr.finalize_round(round_id).await {
                warn!(round_id, error = %e, "deadline finalize failed");
            }
            return;
        }

        run_tick(&mgr, &round).await;

        // Publish only when the round is still active; a tick that raced
        // an admin EndRound completes silently.
        match mgr.load_round(round_id).await {
            Ok(r) if r.status == RoundStatus::Active => match mgr.rebuild_leaderboard(&r).await {
                Ok(entries) => publish_leaderboard(&mgr, round_id, entries),
                Err(e) => warn!(round_id, error = %e, "leaderboard rebuild failed"),
            },
            _ => return,
        }

        tokio::time::sleep(Duration::from_millis(round.settings.execution_interval_ms)).await;
    }
}

fn publish_leaderboard(mgr: &Arc<RoundManager>, round_id: &str, entries: Vec<LeaderboardEntry>) {
    mgr.bus().publish(PushEvent::LeaderboardUpdate {
        round_id: round_id.to_string(),
        leaderboard: entries,
    });
}

/// One tick: snapshot the participant set, fan out with bounded
/// concurrency, and wait for everyone before the caller rebuilds the
/// leaderboard (no partial-tick publishes).
async fn run_tick(mgr: &Arc<RoundManager>, round: &Round) {
    let wallets = mgr
        .store()
        .smembers(&super::participants_key(&round.id))
        .await
        .unwrap_or_default();
    if wallets.is_empty() {
        return;
    }

    let limit = wallets.len().min(MAX_TICK_CONCURRENCY).max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut tasks = JoinSet::new();

    for wallet in wallets {
        let mgr = mgr.clone();
        let round = round.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            if let Err(e) = execute_participant(&mgr, &round, &wallet).await {
                // One participant's failure never aborts the tick.
                warn!(round_id = %round.id, %wallet, error = %e, "participant execution failed");
            }
        });
    }

    while tasks.join_next().await.is_some() {}
}

/// Sequential per-participant pipeline: for each candidate symbol fetch a
/// price, generate a signal, apply the trade, append a log row; then
/// revalue at fresh prices and persist.
async fn execute_participant(
    mgr: &Arc<RoundManager>,
    round: &Round,
    wallet: &str,
) -> CoreResult<()> {
    let mut participant = match mgr.participant(&round.id, wallet).await {
        Ok(p) => p,
        Err(crate::errors::CoreError::NotFound(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    if !participant.active {
        return Ok(());
    }

    let parsed = participant.binding.parsed().clone();
    let candidates: Vec<String> = parsed
        .candidate_symbols()
        .iter()
        .map(|s| s.to_ascii_uppercase())
        .filter(|s| mgr.feed().is_allowed(s))
        .filter(|s| {
            round.settings.allowed_symbols.is_empty() || round.settings.allowed_symbols.contains(s)
        })
        .take(MAX_SYMBOLS_PER_TICK)
        .collect();
    let policy = TradePolicy {
        max_position_size: round.settings.max_position_size,
        trading_fee: round.settings.trading_fee,
    };
    let realized_before = participant.portfolio.realized_pnl;

    for symbol in candidates {
        let snapshot = match mgr.feed().get_price(&symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Skip the symbol; the participant's other symbols proceed.
                debug!(round_id = %round.id, wallet, symbol, error = %e, "price unavailable");
                continue;
            }
        };

        let signal = match mgr.llm().generate_signal(&snapshot, &parsed).await {
            Ok(signal) => signal,
            Err(e) => {
                warn!(round_id = %round.id, wallet, symbol, error = %e, "signal unavailable");
                continue;
            }
        };

        let executed = match signal.action {
            SignalAction::Buy => {
                participant
                    .portfolio
                    .apply_buy(&symbol, snapshot.price, signal.confidence, &policy)
            }
            SignalAction::Sell => participant.portfolio.apply_sell(&symbol, snapshot.price),
            SignalAction::Hold => false,
        };

        let entry = TradeLogEntry {
            ts: now_ms(),
            symbol: symbol.clone(),
            action: signal.action.as_str().to_string(),
            price: snapshot.price,
            confidence: signal.confidence,
            reason: signal.reason.clone(),
            executed,
        };
        if let Ok(json) = serde_json::to_string(&entry) {
            // Timestamp-keyed; the symbol suffix keeps same-millisecond
            // entries from clobbering each other.
            let field = format!("{}:{}", entry.ts, entry.symbol);
            let _ = mgr
                .store()
                .hset(&logs_key(&round.id, wallet), &field, &json)
                .await;
        }
    }

    // Revalue at fresh prices after all candidates processed.
    let mut prices = HashMap::new();
    let held: Vec<String> = participant.portfolio.positions.keys().cloned().collect();
    for symbol in held {
        if let Ok(snapshot) = mgr.feed().get_price(&symbol).await {
            prices.insert(symbol, snapshot.price);
        }
    }
    participant.portfolio.revalue(&prices);

    // Licensed strategies share realized profit with the licensor,
    // at the royalty captured when the license was issued.
    let realized_delta = participant.portfolio.realized_pnl - realized_before;
    if realized_delta > 0.0 {
        if let StrategyBinding::Licensed {
            royalty_percent, ..
        } = &participant.binding
        {
            let amount = realized_delta * royalty_percent / 100.0;
            if let Err(e) = mgr
                .registry()
                .record_royalty(wallet, &round.id, amount)
                .await
            {
                warn!(round_id = %round.id, wallet, error = %e, "royalty not recorded");
            }
        }
    }

    mgr.save_participant(round, &participant).await
}
