//! Natural-language request → round configuration.

use super::manager::{CreateRound, RoundManager};
use super::Round;
use crate::errors::CoreResult;
use crate::llm::RoundDraft;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Caller overrides applied on top of the LLM draft.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptOverrides {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Seconds.
    pub duration: Option<u64>,
    pub starting_balance: Option<f64>,
    pub min_participants: Option<u32>,
    pub max_participants: Option<u32>,
    /// Seconds.
    pub execution_interval: Option<u64>,
    pub allowed_tokens: Option<Vec<String>>,
    pub auto_start: Option<bool>,
    pub expected_profit_percent: Option<f64>,
}

impl RoundManager {
    /// Ask the LLM to draft a round from a prose request, merge caller
    /// overrides, and create it. Returns the round plus the extracted
    /// draft so callers can show what was understood.
    pub async fn round_from_prompt(
        self: &Arc<Self>,
        query: &str,
        overrides: PromptOverrides,
    ) -> CoreResult<(Round, RoundDraft)> {
        let draft = self.llm().parse_round_prompt(query).await?;
        info!(title = %draft.title, tokens = ?draft.tokens, "round drafted from prompt");

        let cfg = CreateRound {
            title: overrides.title.or_else(|| Some(draft.title.clone())),
            description: overrides
                .description
                .or_else(|| Some(draft.description.clone())),
            duration: overrides.duration.unwrap_or(draft.duration_secs),
            starting_balance: overrides
                .starting_balance
                .or(Some(draft.starting_balance)),
            min_participants: overrides.min_participants,
            max_participants: overrides.max_participants,
            execution_interval: overrides.execution_interval,
            allowed_tokens: overrides
                .allowed_tokens
                .or_else(|| Some(draft.tokens.clone())),
            auto_start: overrides.auto_start,
            expected_profit_percent: overrides
                .expected_profit_percent
                .or(Some(draft.target_profit_percent)),
        };

        let round = self.create_round(cfg).await?;
        Ok((round, draft))
    }
}
