//! Error types shared across the engine.
//!
//! External-facing commands surface these directly; the tick scheduler
//! downgrades upstream failures (LLM, price feed) to fallbacks instead of
//! propagating them.

use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid input: bad royalty, unknown symbol, malformed request.
    #[error("{0}")]
    Validation(String),

    /// State conflict: already joined, already licensed, round full,
    /// wrong lifecycle state.
    #[error("{0}")]
    Conflict(String),

    /// Round / participant / strategy not found.
    #[error("{0} not found")]
    NotFound(String),

    /// External store unreachable while running in strict mode.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// LLM upstream failed and no fallback applied at this layer.
    #[error("llm upstream error: {0}")]
    LlmUpstream(String),

    /// Price upstream failed and no fallback applied at this layer.
    #[error("price upstream error: {0}")]
    PriceUpstream(String),

    /// Catch-all; surfaced with a generic message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Stable machine-readable tag for the result envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict_error",
            Self::NotFound(_) => "not_found",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::LlmUpstream(_) => "llm_upstream",
            Self::PriceUpstream(_) => "price_upstream",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("json: {err}"))
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Internal(err.to_string())
    }
}
