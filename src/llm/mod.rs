//! LLM access: strategy parsing, trade signals, prompt-to-round drafts.
//!
//! Every request funnels through one process-wide queue with a single
//! worker. The worker enforces a minimum gap between upstream calls, a
//! post-request delay, and a penalty sleep plus retry of the same job on a
//! 429 — this queue is the pacing knob for the whole engine. Raw model
//! output is never trusted: it passes tolerant JSON extraction and a
//! schema-repair pass before anything downstream sees it.

mod extract;
mod groq;
mod prompts;

pub use groq::GroqChat;

pub use extract::{extract_json, fallback_parsed_strategy};

use crate::errors::{CoreError, CoreResult};
use crate::feeds::MarketSnapshot;
use crate::strategy::ParsedStrategy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Discrete trade directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            "HOLD" => Some(Self::Hold),
            _ => None,
        }
    }
}

/// Schema-repaired model output. Invariants: confidence in [1, 10], every
/// price positive, and for BUY `stop_loss < entry_price < take_profit`
/// (SELL inverse).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub action: SignalAction,
    pub confidence: f64,
    pub reason: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward: f64,
}

/// Round configuration drafted from a natural-language request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundDraft {
    pub title: String,
    pub description: String,
    pub tokens: Vec<String>,
    pub duration_secs: u64,
    pub starting_balance: f64,
    pub investment_amount: Option<f64>,
    pub target_profit_percent: f64,
    pub strategy: Option<String>,
    pub game_type: String,
    pub risk_level: String,
    pub timeframe: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("{0}")]
    Upstream(String),
}

/// Chat-completion backend; kept behind a trait so tests can script output.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, ChatError>;
}

#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub min_interval: Duration,
    pub post_delay: Duration,
    pub backoff: Duration,
    /// Attempts per job before a persistent 429 is treated as an upstream
    /// failure instead of blocking the queue forever.
    pub max_rate_limit_retries: u32,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(2000),
            post_delay: Duration::from_millis(1000),
            backoff: Duration::from_millis(10_000),
            max_rate_limit_retries: 5,
        }
    }
}

struct Job {
    system: String,
    user: String,
    max_tokens: u32,
    temperature: f64,
    reply: oneshot::Sender<Result<String, ChatError>>,
}

pub struct LlmClient {
    tx: mpsc::Sender<Job>,
}

impl LlmClient {
    pub fn spawn(api: Arc<dyn ChatApi>, cfg: LlmClientConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run_worker(api, cfg, rx));
        Arc::new(Self { tx })
    }

    /// Parse prose into a [`ParsedStrategy`]. Upstream failure degrades to
    /// a heuristic fallback; this never propagates an LLM error.
    pub async fn parse_strategy(&self, text: &str) -> CoreResult<ParsedStrategy> {
        let (system, user) = prompts::parse_strategy_prompt(text);
        let parsed = match self.enqueue(system, user, 600, 0.2).await? {
            Ok(raw) => extract::repair_parsed_strategy(extract::extract_json(&raw), text),
            Err(e) => {
                warn!(error = %e, "strategy parse fell back to defaults");
                extract::fallback_parsed_strategy(text)
            }
        };
        Ok(parsed)
    }

    /// Convert market data plus a parsed strategy into a [`Signal`]. Always
    /// yields a schema-valid signal; upstream failures produce the repaired
    /// default (HOLD) rather than an error.
    pub async fn generate_signal(
        &self,
        snapshot: &MarketSnapshot,
        parsed: &ParsedStrategy,
    ) -> CoreResult<Signal> {
        let (system, user) = prompts::signal_prompt(snapshot, parsed);
        let signal = match self.enqueue(system, user, 400, 0.3).await? {
            Ok(raw) => extract::repair_signal(extract::extract_json(&raw), snapshot),
            Err(e) => {
                debug!(symbol = %snapshot.symbol, error = %e, "signal fell back to HOLD");
                extract::fallback_signal(snapshot)
            }
        };
        Ok(signal)
    }

    /// Draft a round configuration from a natural-language request.
    pub async fn parse_round_prompt(&self, query: &str) -> CoreResult<RoundDraft> {
        let (system, user) = prompts::round_prompt(query);
        let draft = match self.enqueue(system, user, 500, 0.3).await? {
            Ok(raw) => extract::repair_round_draft(extract::extract_json(&raw)),
            Err(e) => {
                warn!(error = %e, "round draft fell back to defaults");
                extract::repair_round_draft(None)
            }
        };
        Ok(draft)
    }

    /// Free-form market commentary. Unlike the tick-path operations this is
    /// a direct user command, so upstream failures surface.
    pub async fn market_insight(
        &self,
        snapshot: &MarketSnapshot,
        timeframe: &str,
    ) -> CoreResult<String> {
        let (system, user) = prompts::insight_prompt(snapshot, timeframe);
        self.enqueue(system, user, 500, 0.6)
            .await?
            .map_err(|e| CoreError::LlmUpstream(e.to_string()))
    }

    async fn enqueue(
        &self,
        system: String,
        user: String,
        max_tokens: u32,
        temperature: f64,
    ) -> CoreResult<Result<String, ChatError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Job {
                system,
                user,
                max_tokens,
                temperature,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoreError::Internal("llm worker stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| CoreError::Internal("llm worker dropped reply".into()))
    }
}

async fn run_worker(api: Arc<dyn ChatApi>, cfg: LlmClientConfig, mut rx: mpsc::Receiver<Job>) {
    let mut last_call: Option<Instant> = None;

    while let Some(job) = rx.recv().await {
        let mut attempts = 0u32;
        let result = loop {
            if let Some(last) = last_call {
                let since = last.elapsed();
                if since < cfg.min_interval {
                    tokio::time::sleep(cfg.min_interval - since).await;
                }
            }

            last_call = Some(Instant::now());
            match api
                .chat(&job.system, &job.user, job.max_tokens, job.temperature)
                .await
            {
                Err(ChatError::RateLimited) if attempts < cfg.max_rate_limit_retries => {
                    attempts += 1;
                    warn!(attempts, "llm rate limited; backing off");
                    tokio::time::sleep(cfg.backoff).await;
                    // Same job retries before the queue advances.
                    continue;
                }
                other => break other,
            }
        };

        let _ = job.reply.send(result);
        tokio::time::sleep(cfg.post_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::SnapshotSource;
    use parking_lot::Mutex;

    fn snapshot(price: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "ETH".into(),
            price,
            change_24h: 1.2,
            volume_24h: 1e6,
            liquidity: 2e6,
            market_cap: 3e11,
            source: SnapshotSource::Dex,
            ts: 0,
        }
    }

    fn parsed() -> ParsedStrategy {
        extract::fallback_parsed_strategy("Buy ETH when trending")
    }

    struct ScriptedChat {
        response: String,
    }

    #[async_trait]
    impl ChatApi for ScriptedChat {
        async fn chat(&self, _: &str, _: &str, _: u32, _: f64) -> Result<String, ChatError> {
            Ok(self.response.clone())
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatApi for FailingChat {
        async fn chat(&self, _: &str, _: &str, _: u32, _: f64) -> Result<String, ChatError> {
            Err(ChatError::Upstream("502 bad gateway".into()))
        }
    }

    struct TimedChat {
        calls: Arc<Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl ChatApi for TimedChat {
        async fn chat(&self, _: &str, _: &str, _: u32, _: f64) -> Result<String, ChatError> {
            self.calls.lock().push(Instant::now());
            Ok("{\"signal\":\"HOLD\",\"confidence\":5}".into())
        }
    }

    fn quick_cfg() -> LlmClientConfig {
        LlmClientConfig {
            min_interval: Duration::from_millis(50),
            post_delay: Duration::from_millis(0),
            backoff: Duration::from_millis(10),
            max_rate_limit_retries: 2,
        }
    }

    #[tokio::test]
    async fn well_formed_signal_passes_through() {
        let api = Arc::new(ScriptedChat {
            response: r#"{"signal":"BUY","confidence":7,"reason":"uptrend","entry_price":3000,"stop_loss":2850,"take_profit":3300,"risk_reward":2.0}"#.into(),
        });
        let client = LlmClient::spawn(api, quick_cfg());
        let signal = client
            .generate_signal(&snapshot(3000.0), &parsed())
            .await
            .unwrap();
        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.confidence, 7.0);
        assert_eq!(signal.entry_price, 3000.0);
    }

    #[tokio::test]
    async fn gibberish_still_yields_valid_signal() {
        let api = Arc::new(ScriptedChat {
            response: "the market vibes are immaculate, ser".into(),
        });
        let client = LlmClient::spawn(api, quick_cfg());
        let signal = client
            .generate_signal(&snapshot(3000.0), &parsed())
            .await
            .unwrap();
        assert_eq!(signal.action, SignalAction::Hold);
        assert!((1.0..=10.0).contains(&signal.confidence));
        assert!(signal.entry_price > 0.0);
        assert!(signal.stop_loss > 0.0);
        assert!(signal.take_profit > 0.0);
    }

    #[tokio::test]
    async fn upstream_outage_yields_hold_fallback() {
        let client = LlmClient::spawn(Arc::new(FailingChat), quick_cfg());
        let signal = client
            .generate_signal(&snapshot(3000.0), &parsed())
            .await
            .unwrap();
        assert_eq!(signal.action, SignalAction::Hold);
        assert!(signal.entry_price > 0.0);
    }

    #[tokio::test]
    async fn concurrent_calls_respect_min_interval() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let api = Arc::new(TimedChat {
            calls: calls.clone(),
        });
        let client = LlmClient::spawn(api, quick_cfg());

        let snap = snapshot(3000.0);
        let strat = parsed();
        let (a, b, c) = tokio::join!(
            client.generate_signal(&snap, &strat),
            client.generate_signal(&snap, &strat),
            client.generate_signal(&snap, &strat),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let times = calls.lock();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(
                gap >= Duration::from_millis(50),
                "gap {gap:?} below configured minimum"
            );
        }
    }

    #[tokio::test]
    async fn insight_surfaces_upstream_failure() {
        let client = LlmClient::spawn(Arc::new(FailingChat), quick_cfg());
        let err = client
            .market_insight(&snapshot(3000.0), "1h")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::LlmUpstream(_)));
    }
}
