//! Strategy entities: prose strategies, their LLM-parsed form, marketplace
//! stats, and per-round licenses.

mod registry;

pub use registry::StrategyRegistry;

use serde::{Deserialize, Serialize};

/// Structured form of a natural-language strategy, produced by the LLM and
/// schema-repaired so every field is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedStrategy {
    /// One of `technical`, `fundamental`, `sentiment`, `mixed`.
    pub strategy_type: String,
    pub indicators: Vec<String>,
    pub entry_conditions: String,
    pub exit_conditions: String,
    pub risk_management: String,
    pub timeframe: String,
    pub assets: Vec<String>,
    pub base_ecosystem: bool,
    pub clarity_score: f64,
    pub actionable: bool,
    pub suggested_base_tokens: Vec<String>,
}

impl ParsedStrategy {
    /// Symbols the executor should trade: suggestions first, declared
    /// assets otherwise.
    pub fn candidate_symbols(&self) -> &[String] {
        if self.suggested_base_tokens.is_empty() {
            &self.assets
        } else {
            &self.suggested_base_tokens
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStats {
    pub total_uses: u64,
    pub total_earnings: f64,
    pub total_trades: u64,
    pub successful_trades: u64,
    pub win_rate: f64,
    pub best_performance: f64,
    pub average_return: f64,
}

/// A registered, marketplace-visible strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub id: u64,
    pub owner_wallet: String,
    pub name: String,
    pub description: String,
    pub strategy_text: String,
    pub parsed: ParsedStrategy,
    /// Percent of a licensee's realized profit owed to the owner, in [5, 50].
    pub royalty_percent: f64,
    pub stats: StrategyStats,
    pub active: bool,
    pub verified: bool,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Strategy {
    /// Marketplace ranking score.
    pub fn ranking_score(&self) -> f64 {
        self.stats.win_rate * self.stats.total_uses as f64
    }
}

/// Per-round permission for one wallet to trade another wallet's strategy.
/// The royalty percent is captured at issuance; later changes on the source
/// strategy do not retroactively alter it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub licensee_wallet: String,
    pub strategy_id: u64,
    pub round_id: String,
    pub strategy_owner: String,
    pub royalty_percent: f64,
    pub profit_shared: f64,
    pub active: bool,
    pub created_at: i64,
}

/// Round outcome fed back into a strategy's aggregate stats.
#[derive(Debug, Clone, Copy)]
pub struct StrategyOutcome {
    pub trades: u64,
    pub wins: u64,
    pub return_percent: f64,
    pub earnings: f64,
}
