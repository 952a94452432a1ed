//! Command handlers. Each accepts a structured payload and returns the
//! `{success, …}` result envelope.

use super::{envelope_err, envelope_ok, AppState};
use crate::errors::CoreError;
use crate::llm::fallback_parsed_strategy;
use crate::rounds::{CreateRound, JoinRequest, PromptOverrides};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

pub async fn health(State(state): State<AppState>) -> Response {
    let store_ok = state.store.exists("health:probe").await.is_ok();
    envelope_ok(json!({
        "status": "ok",
        "store": if store_ok { "up" } else { "degraded" },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ---- rounds ----

pub async fn create_round(
    State(state): State<AppState>,
    Json(req): Json<CreateRound>,
) -> Response {
    match state.rounds.create_round(req).await {
        Ok(round) => envelope_ok(json!({ "round": round })),
        Err(e) => envelope_err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PromptRoundRequest {
    pub query: String,
    #[serde(flatten)]
    pub overrides: PromptOverrides,
}

pub async fn create_round_from_prompt(
    State(state): State<AppState>,
    Json(req): Json<PromptRoundRequest>,
) -> Response {
    if req.query.trim().is_empty() {
        return envelope_err(CoreError::validation("Query is required"));
    }
    match state.rounds.round_from_prompt(&req.query, req.overrides).await {
        Ok((round, draft)) => envelope_ok(json!({ "round": round, "extractedData": draft })),
        Err(e) => envelope_err(e),
    }
}

pub async fn get_round(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let round = match state.rounds.get_round(&id).await {
        Ok(round) => round,
        Err(e) => return envelope_err(e),
    };
    let current = state.rounds.current_participants(&id).await.unwrap_or(0);
    envelope_ok(json!({ "round": round, "currentParticipants": current }))
}

#[derive(Debug, Deserialize)]
pub struct ListRoundsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_rounds(
    State(state): State<AppState>,
    Query(query): Query<ListRoundsQuery>,
) -> Response {
    let status = query.status.unwrap_or_else(|| "active".to_string());
    match state
        .rounds
        .list_rounds(&status, query.limit.unwrap_or(20))
        .await
    {
        Ok(rounds) => {
            let count = rounds.len();
            envelope_ok(json!({ "rounds": rounds, "count": count }))
        }
        Err(e) => envelope_err(e),
    }
}

pub async fn join_round(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JoinRequest>,
) -> Response {
    match state.rounds.join_round(&id, req).await {
        Ok(participant) => envelope_ok(json!({ "participant": participant })),
        Err(e) => envelope_err(e),
    }
}

pub async fn start_round(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.rounds.start_round(&id).await {
        Ok(round) => envelope_ok(json!({ "round": round })),
        Err(e) => envelope_err(e),
    }
}

pub async fn end_round(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.rounds.end_round(&id).await {
        Ok(round) => envelope_ok(json!({ "round": round })),
        Err(e) => envelope_err(e),
    }
}

pub async fn cancel_round(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.rounds.cancel_round(&id).await {
        Ok(round) => envelope_ok(json!({ "round": round })),
        Err(e) => envelope_err(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanJoinQuery {
    pub wallet_address: String,
}

pub async fn can_join(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CanJoinQuery>,
) -> Response {
    match state.rounds.can_join(&id, &query.wallet_address).await {
        Ok(result) => envelope_ok(serde_json::to_value(result).unwrap_or_default()),
        Err(e) => envelope_err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    match state
        .rounds
        .leaderboard(&id, query.limit.unwrap_or(10))
        .await
    {
        Ok(entries) => envelope_ok(json!({ "leaderboard": entries })),
        Err(e) => envelope_err(e),
    }
}

pub async fn enhanced_leaderboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    match state
        .rounds
        .enhanced_leaderboard(&id, query.limit.unwrap_or(10))
        .await
    {
        Ok(entries) => envelope_ok(json!({ "leaderboard": entries })),
        Err(e) => envelope_err(e),
    }
}

pub async fn participants(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.rounds.participants(&id).await {
        Ok(list) => {
            let count = list.len();
            envelope_ok(json!({ "participants": list, "count": count }))
        }
        Err(e) => envelope_err(e),
    }
}

pub async fn participant(
    State(state): State<AppState>,
    Path((id, wallet)): Path<(String, String)>,
) -> Response {
    match state.rounds.participant(&id, &wallet).await {
        Ok(p) => envelope_ok(json!({ "participant": p })),
        Err(e) => envelope_err(e),
    }
}

pub async fn participant_logs(
    State(state): State<AppState>,
    Path((id, wallet)): Path<(String, String)>,
    Query(query): Query<LimitQuery>,
) -> Response {
    match state
        .rounds
        .participant_logs(&id, &wallet, query.limit.unwrap_or(50))
        .await
    {
        Ok(logs) => {
            let count = logs.len();
            envelope_ok(json!({ "logs": logs, "count": count }))
        }
        Err(e) => envelope_err(e),
    }
}

// ---- strategies ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterStrategyRequest {
    pub wallet_address: String,
    pub strategy: String,
    pub royalty_percent: f64,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub async fn register_strategy(
    State(state): State<AppState>,
    Json(req): Json<RegisterStrategyRequest>,
) -> Response {
    match state
        .registry
        .register(
            &req.wallet_address.trim().to_ascii_lowercase(),
            &req.strategy,
            req.royalty_percent,
            req.name.as_deref().unwrap_or(""),
            req.description.as_deref().unwrap_or(""),
            req.tags,
        )
        .await
    {
        Ok(strategy) => envelope_ok(json!({ "strategy": strategy })),
        Err(e) => envelope_err(e),
    }
}

pub async fn get_strategy(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.registry.get(id).await {
        Ok(strategy) => envelope_ok(json!({ "strategy": strategy })),
        Err(e) => envelope_err(e),
    }
}

pub async fn user_strategies(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Response {
    match state
        .registry
        .list_by_owner(&wallet.trim().to_ascii_lowercase())
        .await
    {
        Ok(list) => {
            let count = list.len();
            envelope_ok(json!({ "strategies": list, "count": count }))
        }
        Err(e) => envelope_err(e),
    }
}

pub async fn marketplace(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Response {
    match state.registry.list_top(query.limit.unwrap_or(20)).await {
        Ok(list) => {
            let count = list.len();
            envelope_ok(json!({ "strategies": list, "count": count }))
        }
        Err(e) => envelope_err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<usize>,
}

pub async fn search_strategies(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Response {
    match state
        .registry
        .search(&query.q, query.limit.unwrap_or(20))
        .await
    {
        Ok(list) => {
            let count = list.len();
            envelope_ok(json!({ "strategies": list, "count": count }))
        }
        Err(e) => envelope_err(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStatusRequest {
    pub wallet_address: String,
    pub active: bool,
}

pub async fn set_strategy_status(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<StrategyStatusRequest>,
) -> Response {
    match state
        .registry
        .set_status(id, &req.wallet_address.trim().to_ascii_lowercase(), req.active)
        .await
    {
        Ok(strategy) => envelope_ok(json!({ "strategy": strategy })),
        Err(e) => envelope_err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct StrategyVerifyRequest {
    pub verified: bool,
}

pub async fn set_strategy_verified(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<StrategyVerifyRequest>,
) -> Response {
    match state.registry.set_verified(id, req.verified).await {
        Ok(strategy) => envelope_ok(json!({ "strategy": strategy })),
        Err(e) => envelope_err(e),
    }
}

// ---- llm ----

#[derive(Debug, Deserialize)]
pub struct ParseStrategyRequest {
    pub strategy: String,
}

pub async fn parse_strategy(
    State(state): State<AppState>,
    Json(req): Json<ParseStrategyRequest>,
) -> Response {
    if req.strategy.trim().is_empty() {
        return envelope_err(CoreError::validation("Strategy text is required"));
    }
    match state.llm.parse_strategy(&req.strategy).await {
        Ok(parsed) => envelope_ok(json!({ "parsed": parsed })),
        Err(e) => envelope_err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    pub symbol: String,
    pub strategy: String,
}

pub async fn signal(State(state): State<AppState>, Json(req): Json<SignalRequest>) -> Response {
    let snapshot = match state.feed.get_price(&req.symbol).await {
        Ok(snapshot) => snapshot,
        Err(e) => return envelope_err(e),
    };
    let parsed = match state.llm.parse_strategy(&req.strategy).await {
        Ok(parsed) => parsed,
        Err(e) => return envelope_err(e),
    };
    match state.llm.generate_signal(&snapshot, &parsed).await {
        Ok(signal) => envelope_ok(json!({ "signal": signal, "marketData": snapshot })),
        Err(e) => envelope_err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct InsightQuery {
    pub symbol: String,
    pub timeframe: Option<String>,
}

pub async fn insight(
    State(state): State<AppState>,
    Query(query): Query<InsightQuery>,
) -> Response {
    let snapshot = match state.feed.get_price(&query.symbol).await {
        Ok(snapshot) => snapshot,
        Err(e) => return envelope_err(e),
    };
    let timeframe = query.timeframe.as_deref().unwrap_or("24h");
    match state.llm.market_insight(&snapshot, timeframe).await {
        Ok(text) => envelope_ok(json!({ "insight": text, "marketData": snapshot })),
        Err(e) => envelope_err(e),
    }
}

// ---- base market data ----

pub async fn base_price(State(state): State<AppState>, Path(symbol): Path<String>) -> Response {
    match state.feed.get_price(&symbol).await {
        Ok(snapshot) => envelope_ok(json!({ "data": snapshot })),
        Err(e) => envelope_err(e),
    }
}

pub async fn base_top(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Response {
    let mut snapshots = state.feed.get_trending(usize::MAX).await;
    snapshots.sort_by(|a, b| {
        b.market_cap
            .partial_cmp(&a.market_cap)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    snapshots.truncate(query.limit.unwrap_or(10));
    let count = snapshots.len();
    envelope_ok(json!({ "tokens": snapshots, "count": count }))
}

pub async fn base_trending(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let snapshots = state.feed.get_trending(query.limit.unwrap_or(10)).await;
    let count = snapshots.len();
    envelope_ok(json!({ "tokens": snapshots, "count": count }))
}

pub async fn base_tokens(State(state): State<AppState>) -> Response {
    let tokens = state.feed.list_allowed();
    let count = tokens.len();
    envelope_ok(json!({ "tokens": tokens, "count": count }))
}

pub async fn base_strategies(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Response {
    match state.registry.list_top(query.limit.unwrap_or(10)).await {
        Ok(list) => {
            let count = list.len();
            envelope_ok(json!({ "strategies": list, "count": count }))
        }
        Err(e) => envelope_err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct BaseSignalQuery {
    pub symbol: String,
}

pub async fn base_signal(
    State(state): State<AppState>,
    Query(query): Query<BaseSignalQuery>,
) -> Response {
    let snapshot = match state.feed.get_price(&query.symbol).await {
        Ok(snapshot) => snapshot,
        Err(e) => return envelope_err(e),
    };
    // Generic momentum read when the caller brings no strategy of their own.
    let parsed = fallback_parsed_strategy(&format!("momentum trading on {}", query.symbol));
    match state.llm.generate_signal(&snapshot, &parsed).await {
        Ok(signal) => envelope_ok(json!({ "signal": signal, "marketData": snapshot })),
        Err(e) => envelope_err(e),
    }
}
