//! Time-boxed trading rounds: entities, lifecycle, and the per-round
//! execution engine.

mod executor;
mod manager;
mod prompt;

pub use manager::{CanJoin, CreateRound, JoinRequest, RoundManager};
pub use prompt::PromptOverrides;

use crate::portfolio::Portfolio;
use crate::strategy::ParsedStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Waiting,
    Active,
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSettings {
    pub execution_interval_ms: u64,
    /// Fraction of cash one position may take at confidence 10.
    pub max_position_size: f64,
    pub trading_fee: f64,
    /// Empty means "whatever the price feed supports".
    pub allowed_symbols: Vec<String>,
    pub auto_start: bool,
    /// Denominator of the profit score on the enhanced leaderboard.
    pub expected_profit_percent: f64,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            execution_interval_ms: 15_000,
            max_position_size: 0.3,
            trading_fee: 0.001,
            allowed_symbols: Vec::new(),
            auto_start: true,
            expected_profit_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStats {
    pub total_participants: u32,
    pub total_trades: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub description: String,
    pub duration_ms: u64,
    pub starting_balance: f64,
    pub min_participants: u32,
    pub max_participants: u32,
    pub settings: RoundSettings,
    pub status: RoundStatus,
    pub created_at: i64,
    pub start_at: Option<i64>,
    pub end_at: Option<i64>,
    pub stats: RoundStats,
}

impl Round {
    /// Records outlive the round by an hour.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.duration_ms) + Duration::from_secs(3600)
    }
}

/// How a participant's strategy was bound at join time. Exactly one variant
/// per participant per round; the licensed variant carries the royalty
/// captured when the license was issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum StrategyBinding {
    Inline {
        parsed: ParsedStrategy,
    },
    Owned {
        strategy_id: u64,
        parsed: ParsedStrategy,
    },
    Licensed {
        strategy_id: u64,
        licensor_wallet: String,
        royalty_percent: f64,
        parsed: ParsedStrategy,
    },
}

impl StrategyBinding {
    pub fn parsed(&self) -> &ParsedStrategy {
        match self {
            Self::Inline { parsed }
            | Self::Owned { parsed, .. }
            | Self::Licensed { parsed, .. } => parsed,
        }
    }

    pub fn strategy_id(&self) -> Option<u64> {
        match self {
            Self::Inline { .. } => None,
            Self::Owned { strategy_id, .. } | Self::Licensed { strategy_id, .. } => {
                Some(*strategy_id)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub round_id: String,
    pub wallet_address: String,
    pub username: String,
    pub binding: StrategyBinding,
    pub portfolio: Portfolio,
    pub joined_at: i64,
    pub active: bool,
}

/// One row of a participant's trade log, keyed by timestamp in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogEntry {
    pub ts: i64,
    pub symbol: String,
    pub action: String,
    pub price: f64,
    pub confidence: f64,
    pub reason: String,
    pub executed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub wallet_address: String,
    pub username: String,
    pub pnl: f64,
    pub pnl_percentage: f64,
    pub total_value: f64,
    pub trades: u64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedLeaderboardEntry {
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
    /// `actual% / expected%`.
    pub profit_score: f64,
    pub grade: &'static str,
}

pub(crate) fn profit_grade(score: f64) -> &'static str {
    if score >= 2.0 {
        "S"
    } else if score >= 1.5 {
        "A+"
    } else if score >= 1.0 {
        "A"
    } else if score >= 0.75 {
        "B"
    } else if score >= 0.5 {
        "C"
    } else if score >= 0.25 {
        "D"
    } else {
        "F"
    }
}

// Persisted key layout.

pub(crate) fn round_key(id: &str) -> String {
    format!("round:{id}")
}

pub(crate) fn round_number_key(number: u64) -> String {
    format!("round:number:{number}")
}

pub(crate) fn participants_key(id: &str) -> String {
    format!("round:{id}:participants")
}

pub(crate) fn participant_key(id: &str, wallet: &str) -> String {
    format!("round:{id}:participant:{wallet}")
}

pub(crate) fn logs_key(id: &str, wallet: &str) -> String {
    format!("round:{id}:logs:{wallet}")
}

pub(crate) fn leaderboard_key(id: &str) -> String {
    format!("round:{id}:leaderboard")
}

pub(crate) const ROUNDS_ACTIVE: &str = "rounds:active";
pub(crate) const ROUNDS_RUNNING: &str = "rounds:running";
pub(crate) const ROUNDS_FINISHED: &str = "rounds:finished";
pub(crate) const ROUND_COUNTER: &str = "round:counter";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_cover_the_score_range() {
        assert_eq!(profit_grade(2.5), "S");
        assert_eq!(profit_grade(1.2), "A");
        assert_eq!(profit_grade(0.8), "B");
        assert_eq!(profit_grade(0.1), "F");
        assert_eq!(profit_grade(-1.0), "F");
    }

    #[test]
    fn round_ttl_is_duration_plus_one_hour() {
        let round = Round {
            id: "r".into(),
            number: 1,
            title: String::new(),
            description: String::new(),
            duration_ms: 60_000,
            starting_balance: 10_000.0,
            min_participants: 1,
            max_participants: 2,
            settings: RoundSettings::default(),
            status: RoundStatus::Waiting,
            created_at: 0,
            start_at: None,
            end_at: None,
            stats: RoundStats::default(),
        };
        assert_eq!(round.ttl(), Duration::from_secs(60 + 3600));
    }
}
