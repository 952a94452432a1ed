//! HTTP command surface and WebSocket push sink.
//!
//! Thin dispatch: every command forwards to the core and wraps the result
//! in a `{success, …}` envelope. The WebSocket endpoint subscribes to the
//! event bus once per client and relays events as JSON.

mod routes;

use crate::errors::CoreError;
use crate::events::EventBus;
use crate::feeds::PriceFeed;
use crate::llm::LlmClient;
use crate::rounds::RoundManager;
use crate::store::KvStore;
use crate::strategy::StrategyRegistry;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KvStore>,
    pub feed: Arc<PriceFeed>,
    pub llm: Arc<LlmClient>,
    pub registry: Arc<StrategyRegistry>,
    pub rounds: Arc<RoundManager>,
    pub bus: EventBus,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/ws", get(ws_handler))
        .route("/api/rounds", post(routes::create_round).get(routes::list_rounds))
        .route("/api/rounds/from-prompt", post(routes::create_round_from_prompt))
        .route("/api/rounds/:id", get(routes::get_round))
        .route("/api/rounds/:id/join", post(routes::join_round))
        .route("/api/rounds/:id/start", post(routes::start_round))
        .route("/api/rounds/:id/end", post(routes::end_round))
        .route("/api/rounds/:id/cancel", post(routes::cancel_round))
        .route("/api/rounds/:id/can-join", get(routes::can_join))
        .route("/api/rounds/:id/leaderboard", get(routes::leaderboard))
        .route(
            "/api/rounds/:id/leaderboard/enhanced",
            get(routes::enhanced_leaderboard),
        )
        .route("/api/rounds/:id/participants", get(routes::participants))
        .route(
            "/api/rounds/:id/participants/:wallet",
            get(routes::participant),
        )
        .route(
            "/api/rounds/:id/participants/:wallet/logs",
            get(routes::participant_logs),
        )
        .route("/api/strategies", post(routes::register_strategy))
        .route("/api/strategies/marketplace", get(routes::marketplace))
        .route("/api/strategies/search", get(routes::search_strategies))
        .route("/api/strategies/user/:wallet", get(routes::user_strategies))
        .route("/api/strategies/:id", get(routes::get_strategy))
        .route("/api/strategies/:id/status", post(routes::set_strategy_status))
        .route("/api/strategies/:id/verify", post(routes::set_strategy_verified))
        .route("/api/llm/parse-strategy", post(routes::parse_strategy))
        .route("/api/llm/signal", post(routes::signal))
        .route("/api/llm/insight", get(routes::insight))
        .route("/api/base/price/:symbol", get(routes::base_price))
        .route("/api/base/top", get(routes::base_top))
        .route("/api/base/trending", get(routes::base_trending))
        .route("/api/base/tokens", get(routes::base_tokens))
        .route("/api/base/strategies", get(routes::base_strategies))
        .route("/api/base/signal", get(routes::base_signal))
        .with_state(state)
}

/// Success envelope: `{"success": true}` merged with the payload fields.
pub(crate) fn envelope_ok(fields: Value) -> Response {
    let mut body = json!({ "success": true });
    if let (Some(target), Some(extra)) = (body.as_object_mut(), fields.as_object()) {
        for (k, v) in extra {
            target.insert(k.clone(), v.clone());
        }
    }
    (StatusCode::OK, Json(body)).into_response()
}

pub(crate) fn envelope_err(err: CoreError) -> Response {
    let status = match &err {
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::LlmUpstream(_) | CoreError::PriceUpstream(_) => StatusCode::BAD_GATEWAY,
        CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = json!({
        "success": false,
        "error": err.kind(),
        "message": err.to_string(),
    });
    (status, Json(body)).into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| relay_events(socket, state.bus.clone()))
}

/// Relay bus events to one client until it disconnects. Lagged receivers
/// skip ahead rather than disconnecting.
async fn relay_events(mut socket: WebSocket, bus: EventBus) {
    let mut rx = bus.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let Ok(payload) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(payload)).await.is_err() {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    debug!(dropped = n, "ws subscriber lagged");
                }
                Err(_) => return,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {} // pings and client chatter are ignored
                Some(Err(_)) => return,
            },
        }
    }
}
