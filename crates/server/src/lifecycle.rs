// crates/server/src/lifecycle.rs
//! Task lifecycle manager — the only writer of tasks and turns.
//!
//! All writes for one agent are serialized behind a per-agent async mutex
//! shared with the transcript reconciler, so hook delivery and transcript
//! catch-up never interleave mid-transition. The state machine itself is
//! pure (`taskdeck_core::next_state`); this module owns the persistence
//! and event side effects around it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use taskdeck_core::llm::{ClassifierCache, IntentClassifier};
use taskdeck_core::types::{Agent, Task, Turn};
use taskdeck_core::{next_state, Actor, Intent, IntentDetector, TaskState};
use taskdeck_db::queries::events::NewEvent;
use taskdeck_db::{events, tasks, turns, Database};
use tokio::sync::broadcast;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::live::LifecycleEvent;

/// Identical text from the same agent and actor inside this window is one
/// delivery, not two turns.
const DEDUP_WINDOW_MS: i64 = 30_000;

/// Transcript lines scanned when recovering the instruction of an
/// inferred task.
const RECOVERY_TAIL_LINES: usize = 50;

/// What a recorded turn did to the world.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: String,
    pub task_id: String,
    pub state: TaskState,
    pub intent: Intent,
    /// True when the delivery was absorbed as a duplicate; no state changed.
    pub duplicate: bool,
}

pub struct TaskLifecycleManager {
    db: Database,
    detector: IntentDetector,
    classifier: Option<Arc<dyn IntentClassifier>>,
    advisory_cache: Arc<ClassifierCache>,
    tx: broadcast::Sender<LifecycleEvent>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaskLifecycleManager {
    pub fn new(
        db: Database,
        classifier: Option<Arc<dyn IntentClassifier>>,
        tx: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            db,
            detector: IntentDetector::new(),
            classifier,
            advisory_cache: Arc::new(ClassifierCache::new()),
            tx,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the write lock for one agent. The reconciler takes the same
    /// lock before correcting timestamps.
    pub async fn lock_agent(&self, agent_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("lock map poisoned");
            locks
                .entry(agent_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry for an ended agent.
    pub fn forget_agent(&self, agent_id: &str) {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks.remove(agent_id);
    }

    /// Content hash keying the turns dedup index: agent, actor, normalized
    /// text, and a 30-second timing bucket.
    fn dedup_key(agent_id: &str, actor: Actor, text: &str, ts: i64) -> String {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut hasher = Sha256::new();
        hasher.update(agent_id.as_bytes());
        hasher.update([0]);
        hasher.update(actor.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(normalized.as_bytes());
        hasher.update([0]);
        hasher.update((ts / DEDUP_WINDOW_MS).to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn record_user_turn(
        &self,
        agent: &Agent,
        text: &str,
        ts: i64,
    ) -> ApiResult<TurnOutcome> {
        self.record_turn(agent, Actor::User, text, ts, None, false)
            .await
    }

    pub async fn record_agent_turn(
        &self,
        agent: &Agent,
        text: &str,
        ts: i64,
        forced_intent: Option<Intent>,
    ) -> ApiResult<TurnOutcome> {
        self.record_turn(agent, Actor::Agent, text, ts, forced_intent, false)
            .await
    }

    /// Backfill path used by the reconciler: the timestamp comes from the
    /// transcript and is authoritative from the start.
    pub async fn record_backfilled_turn(
        &self,
        agent: &Agent,
        actor: Actor,
        text: &str,
        ts: i64,
    ) -> ApiResult<TurnOutcome> {
        let outcome = self.record_turn(agent, actor, text, ts, None, true).await?;
        if !outcome.duplicate {
            events::append(
                &self.db,
                NewEvent::new("turn_backfilled")
                    .agent(&agent.id)
                    .task(&outcome.task_id)
                    .turn(&outcome.turn_id),
                ts,
            )
            .await?;
            let _ = self.tx.send(LifecycleEvent::TurnBackfilled {
                turn_id: outcome.turn_id.clone(),
                task_id: outcome.task_id.clone(),
            });
        }
        Ok(outcome)
    }

    async fn record_turn(
        &self,
        agent: &Agent,
        actor: Actor,
        text: &str,
        ts: i64,
        forced_intent: Option<Intent>,
        authoritative: bool,
    ) -> ApiResult<TurnOutcome> {
        let _guard = self.lock_agent(&agent.id).await;

        let open = tasks::open_for_agent(&self.db, &agent.id).await?;

        // Duplicate delivery: same content inside the window is a no-op,
        // reported as success to the sender.
        if let Some(existing) =
            turns::find_recent_identical(&self.db, &agent.id, actor, text, ts, DEDUP_WINDOW_MS)
                .await?
        {
            tracing::debug!(
                agent_id = %agent.id,
                turn_id = %existing.id,
                "duplicate delivery absorbed"
            );
            let state = match &open {
                Some(task) => task.state,
                None => TaskState::Complete,
            };
            return Ok(TurnOutcome {
                turn_id: existing.id,
                task_id: existing.task_id,
                state,
                intent: existing.intent,
                duplicate: true,
            });
        }

        let detection = self.detector.detect(actor, text, open.is_some());
        let intent = forced_intent.unwrap_or(detection.intent);

        // Only a user turn may open a task. With no open task, an agent
        // turn is a straggler and attaches to the latest (complete) task,
        // where the transition table rejects any state change; a backfilled
        // entry older than that task's newest turn likewise joins it, since
        // it belongs to settled history. An agent turn with no task history
        // at all means the opening command was missed, the same gap the
        // tool-activity path infers through.
        let task = match open {
            Some(task) => task,
            None => {
                let latest = tasks::latest_for_agent(&self.db, &agent.id).await?;
                let joins_settled = match (&latest, authoritative) {
                    (Some(latest), true) => {
                        turns::newest_timestamp_for_task(&self.db, &latest.id)
                            .await?
                            .is_some_and(|newest| ts < newest)
                    }
                    _ => false,
                };
                if actor == Actor::User && !joins_settled {
                    self.start_task(agent, intent, text, ts).await?
                } else {
                    match latest {
                        Some(latest) => latest,
                        None => self.start_inferred_task(agent, ts).await?,
                    }
                }
            }
        };

        // A backfilled entry older than the task's newest turn belongs to
        // settled history: record it, but do not re-run the state machine
        // against the task's current state.
        let stale = authoritative
            && turns::newest_timestamp_for_task(&self.db, &task.id)
                .await?
                .is_some_and(|newest| ts < newest);

        // An inferred task gets its instruction from the first user text
        // that reaches it, usually via reconciler backfill.
        if actor == Actor::User && task.instruction.is_none() {
            tasks::set_instruction_if_missing(&self.db, &task.id, text).await?;
        }

        let turn = Turn {
            id: Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            actor,
            intent,
            text: text.to_string(),
            summary: None,
            frustration: None,
            timestamp: ts,
            authoritative,
        };
        let dedup = Self::dedup_key(&agent.id, actor, text, ts);
        if !turns::insert(&self.db, &turn, &dedup).await? {
            // Lost the race against an identical insert on the unique index.
            return Ok(TurnOutcome {
                turn_id: turn.id,
                task_id: task.id,
                state: task.state,
                intent,
                duplicate: true,
            });
        }
        events::append(
            &self.db,
            NewEvent::new("turn_recorded")
                .agent(&agent.id)
                .task(&task.id)
                .turn(&turn.id)
                .detail(intent.as_str()),
            ts,
        )
        .await?;

        let state = if stale {
            task.state
        } else {
            self.apply_transition(agent, &task, actor, intent, ts)
                .await?
        };

        let _ = self.tx.send(LifecycleEvent::TurnRecorded {
            agent_id: agent.id.clone(),
            task_id: task.id.clone(),
            turn_id: turn.id.clone(),
            intent,
        });

        // Ambiguous agent text may be escalated to the LLM, strictly as an
        // annotation; the deterministic result above already stands.
        if detection.is_ambiguous() && forced_intent.is_none() && actor == Actor::Agent {
            self.spawn_advisory_classification(&agent.id, &turn.id, text, ts);
        }

        Ok(TurnOutcome {
            turn_id: turn.id,
            task_id: task.id,
            state,
            intent,
            duplicate: false,
        })
    }

    /// Open a fresh task for a user turn. A command captures the
    /// instruction; anything else leaves it empty for later recovery.
    async fn start_task(
        &self,
        agent: &Agent,
        intent: Intent,
        text: &str,
        ts: i64,
    ) -> ApiResult<Task> {
        let instruction = (intent == Intent::Command).then(|| text.to_string());
        let task = Task {
            id: Uuid::new_v4().to_string(),
            agent_id: agent.id.clone(),
            state: TaskState::Idle,
            instruction,
            summary: None,
            started_at: ts,
            completed_at: None,
        };
        tasks::insert(&self.db, &task).await?;
        events::append(
            &self.db,
            NewEvent::new("task_started").agent(&agent.id).task(&task.id),
            ts,
        )
        .await?;
        Ok(task)
    }

    /// Run the state machine over one turn and persist the result. Returns
    /// the task's state afterwards. Invalid triples keep the state and log
    /// an `invalid_transition` event.
    async fn apply_transition(
        &self,
        agent: &Agent,
        task: &Task,
        actor: Actor,
        intent: Intent,
        ts: i64,
    ) -> ApiResult<TaskState> {
        match next_state(task.state, actor, intent) {
            Some(new_state) if new_state != task.state => {
                if new_state == TaskState::Complete {
                    tasks::complete(&self.db, &task.id, ts).await?;
                    self.spawn_summary(task, ts);
                } else {
                    tasks::update_state(&self.db, &task.id, new_state).await?;
                }
                events::append(
                    &self.db,
                    NewEvent::new("task_transition")
                        .agent(&agent.id)
                        .task(&task.id)
                        .detail(format!("{} -> {}", task.state, new_state)),
                    ts,
                )
                .await?;
                let _ = self.tx.send(LifecycleEvent::TaskTransition {
                    agent_id: agent.id.clone(),
                    task_id: task.id.clone(),
                    from: task.state,
                    to: new_state,
                });
                Ok(new_state)
            }
            Some(same) => Ok(same),
            None => {
                tracing::debug!(
                    agent_id = %agent.id,
                    task_id = %task.id,
                    state = %task.state,
                    actor = %actor,
                    intent = %intent,
                    "no transition for turn; state unchanged"
                );
                events::append(
                    &self.db,
                    NewEvent::new("invalid_transition")
                        .agent(&agent.id)
                        .task(&task.id)
                        .detail(format!("{} + {}/{}", task.state, actor, intent)),
                    ts,
                )
                .await?;
                Ok(task.state)
            }
        }
    }

    /// Tool activity implies the agent is working. Moves an IDLE or
    /// COMMANDED task to PROCESSING; never touches AWAITING_INPUT, and a
    /// COMPLETE task is never reopened. With no open task at all, a task is
    /// inferred and its instruction recovered from the transcript tail.
    pub async fn infer_processing(&self, agent: &Agent, ts: i64) -> ApiResult<TaskState> {
        let _guard = self.lock_agent(&agent.id).await;

        if let Some(task) = tasks::open_for_agent(&self.db, &agent.id).await? {
            if matches!(task.state, TaskState::Idle | TaskState::Commanded) {
                tasks::update_state(&self.db, &task.id, TaskState::Processing).await?;
                events::append(
                    &self.db,
                    NewEvent::new("task_transition")
                        .agent(&agent.id)
                        .task(&task.id)
                        .detail(format!("{} -> processing (inferred)", task.state)),
                    ts,
                )
                .await?;
                let _ = self.tx.send(LifecycleEvent::TaskTransition {
                    agent_id: agent.id.clone(),
                    task_id: task.id.clone(),
                    from: task.state,
                    to: TaskState::Processing,
                });
                return Ok(TaskState::Processing);
            }
            return Ok(task.state);
        }

        // Tool activity with no open task: the opening user command was
        // missed. Infer the task and try to recover its instruction.
        let task = self.start_inferred_task(agent, ts).await?;
        Ok(task.state)
    }

    /// Open an inferred task for activity whose opening user command was
    /// never observed. Caller holds the agent lock.
    async fn start_inferred_task(&self, agent: &Agent, ts: i64) -> ApiResult<Task> {
        let instruction = self.recover_instruction(agent).await;
        let task = Task {
            id: Uuid::new_v4().to_string(),
            agent_id: agent.id.clone(),
            state: TaskState::Processing,
            instruction: instruction.clone(),
            summary: None,
            started_at: ts,
            completed_at: None,
        };
        tasks::insert(&self.db, &task).await?;
        events::append(
            &self.db,
            NewEvent::new("task_started")
                .agent(&agent.id)
                .task(&task.id)
                .detail("inferred"),
            ts,
        )
        .await?;
        if instruction.is_none() {
            events::append(
                &self.db,
                NewEvent::new("missing_user_turn")
                    .agent(&agent.id)
                    .task(&task.id)
                    .detail("no user entry in transcript tail"),
                ts,
            )
            .await?;
        }
        let _ = self.tx.send(LifecycleEvent::TaskTransition {
            agent_id: agent.id.clone(),
            task_id: task.id.clone(),
            from: TaskState::Idle,
            to: TaskState::Processing,
        });
        Ok(task)
    }

    /// Best-effort: the last user entry in the transcript tail is the
    /// instruction that opened the missed task.
    async fn recover_instruction(&self, agent: &Agent) -> Option<String> {
        let path = agent.transcript_path.as_deref()?;
        let lines = taskdeck_core::tail::tail_lines(std::path::Path::new(path), RECOVERY_TAIL_LINES)
            .await
            .map_err(|err| {
                tracing::debug!(path = %path, error = %err, "instruction recovery read failed");
            })
            .ok()?;
        taskdeck_core::transcript::parse_transcript_lines(&lines)
            .into_iter()
            .rev()
            .find(|entry| entry.actor == Actor::User)
            .map(|entry| entry.text)
    }

    /// Fire-and-forget task summary on the terminal transition. Failures
    /// only log; the task is already complete.
    fn spawn_summary(&self, task: &Task, ts: i64) {
        let Some(classifier) = self.classifier.clone() else {
            return;
        };
        let Some(instruction) = task.instruction.clone() else {
            return;
        };
        let db = self.db.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move {
            let outcome = turns::list_for_task(&db, &task_id)
                .await
                .ok()
                .and_then(|turns| {
                    turns
                        .into_iter()
                        .rev()
                        .find(|t| t.actor == Actor::Agent)
                        .map(|t| t.text)
                })
                .unwrap_or_default();
            match classifier.summarize(&instruction, &outcome).await {
                Ok(summary) => {
                    if let Err(err) = tasks::set_summary(&db, &task_id, &summary).await {
                        tracing::warn!(task_id = %task_id, error = %err, "summary write failed");
                    }
                    let _ = events::append(
                        &db,
                        NewEvent::new("task_summarized").task(&task_id),
                        ts,
                    )
                    .await;
                }
                Err(err) => {
                    tracing::warn!(task_id = %task_id, error = %err, "summary generation failed");
                }
            }
        });
    }

    /// Advisory LLM pass over an ambiguous agent turn. The result is an
    /// events-table annotation; the recorded intent never changes and the
    /// state machine never re-runs. Results are cached by content hash so
    /// repeated text never re-spawns the classifier.
    fn spawn_advisory_classification(&self, agent_id: &str, turn_id: &str, text: &str, ts: i64) {
        let Some(classifier) = self.classifier.clone() else {
            return;
        };
        let db = self.db.clone();
        let cache = self.advisory_cache.clone();
        let agent_id = agent_id.to_string();
        let turn_id = turn_id.to_string();
        let text = text.to_string();
        tokio::spawn(async move {
            let key = ClassifierCache::key(Actor::Agent, &text);
            let classified = match cache.get(&key) {
                Some(hit) => hit,
                None => match classifier.classify(Actor::Agent, &text).await {
                    Ok(fresh) => {
                        cache.insert(key, fresh.clone());
                        fresh
                    }
                    Err(err) => {
                        tracing::debug!(turn_id = %turn_id, error = %err, "advisory classification failed");
                        return;
                    }
                },
            };
            let _ = events::append(
                &db,
                NewEvent::new("intent_advisory")
                    .agent(&agent_id)
                    .turn(&turn_id)
                    .detail(format!(
                        "{} ({:.2})",
                        classified.intent, classified.confidence
                    )),
                ts,
            )
            .await;
        });
    }
}
