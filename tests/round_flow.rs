//! End-to-end round scenarios against the in-memory store with scripted
//! price and chat backends.

mod common;

use arenabot_backend::errors::CoreError;
use arenabot_backend::rounds::{CreateRound, JoinRequest, RoundStatus};
use common::{eth_toshi_prices, harness, BuyEthChat, OutageChat};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn round_cfg(duration_secs: u64, min: u32, max: u32) -> CreateRound {
    CreateRound {
        title: Some("Test Round".into()),
        description: None,
        duration: duration_secs,
        starting_balance: Some(10_000.0),
        min_participants: Some(min),
        max_participants: Some(max),
        execution_interval: Some(1),
        allowed_tokens: Some(vec!["ETH".into(), "TOSHI".into()]),
        auto_start: Some(false),
        expected_profit_percent: Some(5.0),
    }
}

fn join_req(wallet: &str) -> JoinRequest {
    JoinRequest {
        wallet_address: wallet.into(),
        username: Some(format!("user-{wallet}")),
        strategy: Some("Buy ETH when trending, watch TOSHI".into()),
        strategy_id: None,
        license_strategy_id: None,
    }
}

#[tokio::test]
async fn happy_path_round_buys_eth_and_ranks() {
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());
    let mut events = h.bus.subscribe();

    let round = h.rounds.create_round(round_cfg(300, 2, 2)).await.unwrap();
    h.rounds.join_round(&round.id, join_req("0xAAA1")).await.unwrap();
    h.rounds.join_round(&round.id, join_req("0xBBB2")).await.unwrap();
    h.rounds.start_round(&round.id).await.unwrap();

    // First tick runs immediately; give the queue a moment to drain.
    tokio::time::sleep(Duration::from_millis(400)).await;

    for participant in h.rounds.participants(&round.id).await.unwrap() {
        let pf = &participant.portfolio;
        // 10_000 × 0.3 × 0.7 = 2_100 notional at $3_000 → 0.7 ETH.
        let eth = pf.positions.get("ETH").expect("long ETH position");
        assert!((eth.amount - 0.7).abs() < 1e-9, "amount {}", eth.amount);
        assert!((eth.total_invested - 2_100.0).abs() < 1e-9);
        assert!((pf.cash - 7_897.9).abs() < 1e-6, "cash {}", pf.cash);
        // TOSHI held, never bought.
        assert!(!pf.positions.contains_key("TOSHI"));

        let logs = h
            .rounds
            .participant_logs(&round.id, &participant.wallet_address, 50)
            .await
            .unwrap();
        assert!(logs.iter().any(|l| l.symbol == "ETH" && l.executed));
        assert!(logs.iter().any(|l| l.symbol == "TOSHI" && !l.executed));
    }

    let leaderboard = h.rounds.leaderboard(&round.id, 10).await.unwrap();
    assert_eq!(leaderboard.len(), 2);
    assert_eq!(leaderboard[0].rank, 1);
    assert_eq!(leaderboard[1].rank, 2);
    assert!(leaderboard[0].pnl_percentage >= leaderboard[1].pnl_percentage);

    // Lifecycle events arrived in order on the bus.
    let mut topics = Vec::new();
    while let Ok(Ok(event)) = timeout(Duration::from_millis(100), events.recv()).await {
        topics.push(event.topic());
        if topics.iter().filter(|t| **t == "leaderboard_update").count() >= 1 {
            break;
        }
    }
    assert_eq!(topics[0], "round_created");
    assert!(topics.contains(&"participant_joined"));
    assert!(topics.contains(&"round_started"));
    assert!(topics.contains(&"leaderboard_update"));

    let ended = h.rounds.end_round(&round.id).await.unwrap();
    assert_eq!(ended.status, RoundStatus::Finished);

    // Terminal state: no transition out of finished.
    let err = h.rounds.end_round(&round.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn concurrent_joins_respect_capacity() {
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());
    let round = h.rounds.create_round(round_cfg(300, 2, 3)).await.unwrap();

    let joins = join_all((0..5).map(|i| {
        let rounds = h.rounds.clone();
        let id = round.id.clone();
        async move { rounds.join_round(&id, join_req(&format!("0xwallet{i}"))).await }
    }))
    .await;

    let successes = joins.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 3);
    for result in joins.iter().filter(|r| r.is_err()) {
        match result.as_ref().unwrap_err() {
            CoreError::Conflict(msg) => assert_eq!(msg, "Round is full"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    let participants = h.rounds.participants(&round.id).await.unwrap();
    assert_eq!(participants.len(), 3);
    let mut wallets: Vec<_> = participants.iter().map(|p| &p.wallet_address).collect();
    wallets.dedup();
    assert_eq!(wallets.len(), 3);
}

#[tokio::test]
async fn same_wallet_cannot_join_twice() {
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());
    let round = h.rounds.create_round(round_cfg(300, 2, 5)).await.unwrap();

    h.rounds.join_round(&round.id, join_req("0xsame")).await.unwrap();
    let err = h
        .rounds
        .join_round(&round.id, join_req("0xSAME"))
        .await
        .unwrap_err();
    match err {
        CoreError::Conflict(msg) => assert_eq!(msg, "Already joined this round"),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn self_license_is_banned_at_join() {
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());
    let strategy = h
        .registry
        .register("0xowner", "Buy ETH on momentum", 10.0, "Momentum", "", vec![])
        .await
        .unwrap();
    let round = h.rounds.create_round(round_cfg(300, 2, 5)).await.unwrap();

    let err = h
        .rounds
        .join_round(
            &round.id,
            JoinRequest {
                wallet_address: "0xOWNER".into(),
                username: None,
                strategy: None,
                strategy_id: None,
                license_strategy_id: Some(strategy.id),
            },
        )
        .await
        .unwrap_err();
    match err {
        CoreError::Validation(msg) => assert_eq!(msg, "Cannot license your own strategy"),
        other => panic!("expected validation, got {other:?}"),
    }
}

#[tokio::test]
async fn one_license_per_wallet_per_round() {
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());
    let strategy = h
        .registry
        .register("0xowner", "Buy ETH on momentum", 15.0, "Momentum", "", vec![])
        .await
        .unwrap();
    let round = h.rounds.create_round(round_cfg(300, 2, 5)).await.unwrap();

    let participant = h
        .rounds
        .join_round(
            &round.id,
            JoinRequest {
                wallet_address: "0xlicensee".into(),
                username: None,
                strategy: None,
                strategy_id: None,
                license_strategy_id: Some(strategy.id),
            },
        )
        .await
        .unwrap();
    // Binding carries the royalty captured at issuance.
    let json = serde_json::to_value(&participant.binding).unwrap();
    assert_eq!(json["kind"], "licensed");
    assert_eq!(json["royaltyPercent"], 15.0);

    let err = h
        .registry
        .license("0xlicensee", strategy.id, &round.id)
        .await
        .unwrap_err();
    match err {
        CoreError::Conflict(msg) => {
            assert_eq!(msg, "Already licensed a strategy for this round")
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn llm_outage_degrades_to_hold_without_trades() {
    let h = harness(Arc::new(OutageChat), eth_toshi_prices());
    let round = h.rounds.create_round(round_cfg(300, 2, 2)).await.unwrap();
    h.rounds.join_round(&round.id, join_req("0xaaa")).await.unwrap();
    h.rounds.join_round(&round.id, join_req("0xbbb")).await.unwrap();
    h.rounds.start_round(&round.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    for participant in h.rounds.participants(&round.id).await.unwrap() {
        assert_eq!(participant.portfolio.trades, 0);
        assert!(participant.portfolio.positions.is_empty());
        assert_eq!(participant.portfolio.cash, 10_000.0);

        let logs = h
            .rounds
            .participant_logs(&round.id, &participant.wallet_address, 50)
            .await
            .unwrap();
        assert!(!logs.is_empty());
        for log in &logs {
            assert_eq!(log.action, "HOLD");
            assert!(!log.executed);
            assert!((1.0..=10.0).contains(&log.confidence));
            assert!(log.price > 0.0);
        }
    }

    // Leaderboard publishes with zero P&L; ties rank deterministically.
    let leaderboard = h.rounds.leaderboard(&round.id, 10).await.unwrap();
    assert_eq!(leaderboard.len(), 2);
    assert!(leaderboard.iter().all(|e| e.pnl_percentage == 0.0));
    assert!(leaderboard[0].wallet_address < leaderboard[1].wallet_address);

    h.rounds.end_round(&round.id).await.unwrap();
}

#[tokio::test]
async fn round_finishes_on_deadline() {
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());
    let round = h.rounds.create_round(round_cfg(2, 2, 2)).await.unwrap();
    h.rounds.join_round(&round.id, join_req("0xaaa")).await.unwrap();
    h.rounds.join_round(&round.id, join_req("0xbbb")).await.unwrap();
    h.rounds.start_round(&round.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;

    let finished = h.rounds.get_round(&round.id).await.unwrap();
    assert_eq!(finished.status, RoundStatus::Finished);

    let listed = h.rounds.list_rounds("finished", 10).await.unwrap();
    assert!(listed.iter().any(|r| r.id == round.id));

    // Execution task is gone: trade counts stay put.
    let trades_then: u64 = h
        .rounds
        .participants(&round.id)
        .await
        .unwrap()
        .iter()
        .map(|p| p.portfolio.trades)
        .sum();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let trades_now: u64 = h
        .rounds
        .participants(&round.id)
        .await
        .unwrap()
        .iter()
        .map(|p| p.portfolio.trades)
        .sum();
    assert_eq!(trades_then, trades_now);
}

#[tokio::test]
async fn lifecycle_transitions_are_guarded() {
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());
    let round = h.rounds.create_round(round_cfg(300, 2, 3)).await.unwrap();

    // Not enough participants to start.
    h.rounds.join_round(&round.id, join_req("0xa")).await.unwrap();
    let err = h.rounds.start_round(&round.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    // Cancel while waiting is terminal.
    let cancelled = h.rounds.cancel_round(&round.id).await.unwrap();
    assert_eq!(cancelled.status, RoundStatus::Cancelled);

    let err = h.rounds.join_round(&round.id, join_req("0xb")).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    let err = h.rounds.start_round(&round.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    let err = h.rounds.cancel_round(&round.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn active_round_cannot_be_cancelled() {
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());
    let round = h.rounds.create_round(round_cfg(300, 2, 2)).await.unwrap();
    h.rounds.join_round(&round.id, join_req("0xa")).await.unwrap();
    h.rounds.join_round(&round.id, join_req("0xb")).await.unwrap();
    h.rounds.start_round(&round.id).await.unwrap();

    let err = h.rounds.cancel_round(&round.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    h.rounds.end_round(&round.id).await.unwrap();
}

#[tokio::test]
async fn can_join_reports_each_obstacle() {
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());

    let missing = h.rounds.can_join("no-such-round", "0xa").await.unwrap();
    assert!(!missing.can_join);

    let round = h.rounds.create_round(round_cfg(300, 1, 1)).await.unwrap();
    let open = h.rounds.can_join(&round.id, "0xa").await.unwrap();
    assert!(open.can_join);

    h.rounds.join_round(&round.id, join_req("0xa")).await.unwrap();
    let joined = h.rounds.can_join(&round.id, "0xA").await.unwrap();
    assert!(!joined.can_join);
    assert_eq!(joined.reason.as_deref(), Some("Already joined this round"));

    let full = h.rounds.can_join(&round.id, "0xother").await.unwrap();
    assert!(!full.can_join);
    assert_eq!(full.reason.as_deref(), Some("Round is full"));
}

#[tokio::test(start_paused = true)]
async fn full_round_auto_starts_after_grace_period() {
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());
    let mut cfg = round_cfg(300, 2, 2);
    cfg.auto_start = Some(true);
    let round = h.rounds.create_round(cfg).await.unwrap();

    h.rounds.join_round(&round.id, join_req("0xa")).await.unwrap();
    h.rounds.join_round(&round.id, join_req("0xb")).await.unwrap();
    assert_eq!(
        h.rounds.get_round(&round.id).await.unwrap().status,
        RoundStatus::Waiting
    );

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(
        h.rounds.get_round(&round.id).await.unwrap().status,
        RoundStatus::Active
    );
}

#[tokio::test]
async fn store_less_deployment_serves_rounds_from_memory() {
    // Permissive mode with no external store: the engine keeps working.
    let h = harness(Arc::new(BuyEthChat), eth_toshi_prices());
    let round = h.rounds.create_round(round_cfg(300, 2, 4)).await.unwrap();
    let loaded = h.rounds.get_round(&round.id).await.unwrap();
    assert_eq!(loaded.id, round.id);
    assert_eq!(loaded.status, RoundStatus::Waiting);

    let listed = h.rounds.list_rounds("active", 10).await.unwrap();
    assert!(listed.iter().any(|r| r.id == round.id));
}

#[tokio::test]
async fn prompt_round_uses_draft_defaults() {
    let h = harness(Arc::new(OutageChat), eth_toshi_prices());
    // LLM down: the draft falls back to documented defaults.
    let (round, draft) = h
        .rounds
        .round_from_prompt("make me a 5 minute ETH battle", Default::default())
        .await
        .unwrap();
    assert_eq!(draft.duration_secs, 300);
    assert_eq!(draft.starting_balance, 10_000.0);
    assert_eq!(round.duration_ms, 300_000);
    assert_eq!(round.settings.allowed_symbols, vec!["ETH", "TOSHI", "DEGEN"]);
}
