// crates/server/src/reaper.rs
//! Background reaper for silent agents.
//!
//! Sessions that crash or lose connectivity never send a session-end hook.
//! The reaper ends any live agent not seen inside the inactivity window,
//! evicting its registry entry and leaving its task/turn history intact.

use std::sync::Arc;
use std::time::Duration;

use taskdeck_db::queries::events::NewEvent;
use taskdeck_db::{agents, events, now_millis};
use tokio::task::JoinHandle;

use crate::live::LifecycleEvent;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How long an agent may stay silent before it is considered gone.
    pub inactivity: Duration,
    /// Sweep interval.
    pub interval: Duration,
}

pub fn spawn(state: Arc<AppState>, config: ReaperConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            if let Err(err) = sweep(&state, config.inactivity).await {
                tracing::warn!(error = %err, "reaper sweep failed");
            }
        }
    })
}

async fn sweep(state: &AppState, inactivity: Duration) -> Result<(), sqlx::Error> {
    let now = now_millis();
    let cutoff = now - inactivity.as_millis() as i64;
    let reaped = agents::reap_inactive(&state.db, cutoff, now).await?;

    for agent in reaped {
        state.registry.remove_agent(&agent.id).await;
        state.lifecycle.forget_agent(&agent.id);
        events::append(
            &state.db,
            NewEvent::new("agent_reaped")
                .agent(&agent.id)
                .detail(format!("last seen {}", agent.last_seen_at)),
            now,
        )
        .await?;
        let _ = state.events_tx.send(LifecycleEvent::AgentEnded {
            agent_id: agent.id.clone(),
        });
        tracing::info!(agent_id = %agent.id, "reaped inactive agent");
    }
    Ok(())
}
