// crates/server/src/live.rs
//! Broadcast channel for lifecycle events.
//!
//! Every state transition, turn write, and reconciliation correction is
//! pushed here fire-and-forget. Subscribers (a future SSE route, tests)
//! attach via `Sender::subscribe`; a send with no receivers is not an error.

use serde::Serialize;
use taskdeck_core::{Intent, TaskState};
use tokio::sync::broadcast;

/// Buffered events per subscriber before lagging kicks in.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LifecycleEvent {
    #[serde(rename_all = "camelCase")]
    AgentStarted { agent_id: String },
    #[serde(rename_all = "camelCase")]
    AgentEnded { agent_id: String },
    #[serde(rename_all = "camelCase")]
    TaskTransition {
        agent_id: String,
        task_id: String,
        from: TaskState,
        to: TaskState,
    },
    #[serde(rename_all = "camelCase")]
    TurnRecorded {
        agent_id: String,
        task_id: String,
        turn_id: String,
        intent: Intent,
    },
    #[serde(rename_all = "camelCase")]
    TurnCorrected { turn_id: String, timestamp: i64 },
    #[serde(rename_all = "camelCase")]
    TurnBackfilled { turn_id: String, task_id: String },
}

pub fn channel() -> broadcast::Sender<LifecycleEvent> {
    broadcast::channel(CHANNEL_CAPACITY).0
}
