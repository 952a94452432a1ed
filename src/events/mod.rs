//! In-process event bus for lifecycle and leaderboard pushes.
//!
//! One typed broadcast channel; the WebSocket layer subscribes once and
//! relays to its clients. Publishing never blocks: slow subscribers lag and
//! drop per broadcast-channel semantics.

use crate::rounds::LeaderboardEntry;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    RoundCreated {
        round_id: String,
        round_number: u64,
        title: String,
    },
    ParticipantJoined {
        round_id: String,
        wallet_address: String,
        username: String,
        total_participants: u32,
    },
    RoundStarted {
        round_id: String,
        end_at: i64,
    },
    RoundEnded {
        round_id: String,
        winner: Option<String>,
    },
    LeaderboardUpdate {
        round_id: String,
        leaderboard: Vec<LeaderboardEntry>,
    },
}

impl PushEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::RoundCreated { .. } => "round_created",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::RoundStarted { .. } => "round_started",
            Self::RoundEnded { .. } => "round_ended",
            Self::LeaderboardUpdate { .. } => "leaderboard_update",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PushEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: PushEvent) {
        let topic = event.topic();
        if let Err(e) = self.tx.send(event) {
            trace!(topic, "no active push subscribers: {e}");
        }
    }
}
