//! ArenaBot Backend Library
//!
//! Core engine for multi-player trading simulation rounds: round
//! orchestration, virtual portfolio accounting, LLM-driven signals, and
//! real-time leaderboards. Exposed as a library so binaries and the
//! integration tests share the same modules.

pub mod api;
pub mod errors;
pub mod events;
pub mod feeds;
pub mod llm;
pub mod models;
pub mod portfolio;
pub mod rounds;
pub mod store;
pub mod strategy;
