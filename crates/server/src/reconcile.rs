// crates/server/src/reconcile.rs
//! Transcript reconciler: corrects provisional hook timestamps against the
//! transcript log and backfills exchanges the hooks never delivered.
//!
//! Hook receipt times lag the actual exchange by network and queueing
//! delay; the transcript log carries the authoritative timestamps. For
//! each new transcript entry the reconciler finds the best-matching
//! provisional turn and promotes it, or, when nothing matches, records the
//! entry as a backfilled turn through the normal lifecycle path. Running
//! twice over the same log is a no-op.

use taskdeck_core::transcript::{parse_transcript_lines, TranscriptEntry};
use taskdeck_core::types::{Agent, Turn};
use taskdeck_db::queries::events::NewEvent;
use taskdeck_db::{events, turns, Database};
use tokio::sync::broadcast;

use crate::error::ApiResult;
use crate::lifecycle::TaskLifecycleManager;
use crate::live::LifecycleEvent;

/// Provisional turns within this window of a transcript entry are
/// correction candidates.
const MATCH_TOLERANCE_MS: i64 = 120_000;

pub struct TranscriptReconciler {
    db: Database,
    lifecycle: std::sync::Arc<TaskLifecycleManager>,
    tx: broadcast::Sender<LifecycleEvent>,
}

/// What reconciling one entry did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// An existing provisional turn was promoted to the authoritative
    /// timestamp.
    Corrected,
    /// No provisional turn matched; the entry became a new turn.
    Backfilled,
    /// The entry was already reconciled (or a duplicate); nothing changed.
    Unchanged,
}

impl TranscriptReconciler {
    pub fn new(
        db: Database,
        lifecycle: std::sync::Arc<TaskLifecycleManager>,
        tx: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self { db, lifecycle, tx }
    }

    /// Reconcile a batch of raw transcript lines for one agent, in log
    /// order.
    pub async fn reconcile_lines(&self, agent: &Agent, lines: &[String]) -> ApiResult<()> {
        for entry in parse_transcript_lines(lines) {
            self.reconcile_entry(agent, &entry).await?;
        }
        Ok(())
    }

    pub async fn reconcile_entry(
        &self,
        agent: &Agent,
        entry: &TranscriptEntry,
    ) -> ApiResult<Reconciliation> {
        // Match under the agent's write lock so a hook landing mid-search
        // can't insert a second copy of the same exchange.
        {
            let _guard = self.lifecycle.lock_agent(&agent.id).await;

            let candidates = turns::provisional_in_window(
                &self.db,
                &agent.id,
                entry.actor,
                entry.timestamp - MATCH_TOLERANCE_MS,
                entry.timestamp + MATCH_TOLERANCE_MS,
            )
            .await?;

            if let Some(matched) = best_match(&candidates, entry) {
                if matched.timestamp == entry.timestamp {
                    // Already promoted on an earlier pass over this log.
                    turns::promote(&self.db, &matched.id, entry.timestamp).await?;
                    return Ok(Reconciliation::Unchanged);
                }
                turns::promote(&self.db, &matched.id, entry.timestamp).await?;
                events::append(
                    &self.db,
                    NewEvent::new("turn_corrected")
                        .agent(&agent.id)
                        .task(&matched.task_id)
                        .turn(&matched.id)
                        .detail(format!("{} -> {}", matched.timestamp, entry.timestamp)),
                    entry.timestamp,
                )
                .await?;
                let _ = self.tx.send(LifecycleEvent::TurnCorrected {
                    turn_id: matched.id.clone(),
                    timestamp: entry.timestamp,
                });
                return Ok(Reconciliation::Corrected);
            }
        }

        // No provisional match: the hook never arrived. Record the entry
        // through the lifecycle manager (it re-acquires the lock), where
        // the dedup key absorbs repeat passes over the same log.
        let outcome = self
            .lifecycle
            .record_backfilled_turn(agent, entry.actor, &entry.text, entry.timestamp)
            .await?;
        if outcome.duplicate {
            Ok(Reconciliation::Unchanged)
        } else {
            Ok(Reconciliation::Backfilled)
        }
    }
}

/// Pick the candidate closest in time, preferring exact text matches over
/// prefix matches. Hook payloads sometimes truncate long text, so a
/// candidate whose text is a prefix of the transcript entry (or vice
/// versa) still counts.
fn best_match<'a>(candidates: &'a [Turn], entry: &TranscriptEntry) -> Option<&'a Turn> {
    let entry_text = entry.text.trim();
    let closest = |turns: Vec<&'a Turn>| {
        turns
            .into_iter()
            .min_by_key(|t| (t.timestamp - entry.timestamp).abs())
    };

    let exact: Vec<&Turn> = candidates
        .iter()
        .filter(|t| t.text.trim() == entry_text)
        .collect();
    if !exact.is_empty() {
        return closest(exact);
    }

    let fuzzy: Vec<&Turn> = candidates
        .iter()
        .filter(|t| {
            let text = t.text.trim();
            !text.is_empty() && (entry_text.starts_with(text) || text.starts_with(entry_text))
        })
        .collect();
    closest(fuzzy)
}
