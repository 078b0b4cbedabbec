// crates/core/src/types.rs
//! Core domain enums and records: agents, tasks, turns, and the audit trail.

use serde::{Deserialize, Serialize};

/// Who produced a turn. Exactly two values — a turn is either something the
/// human typed or something the agent emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User,
    Agent,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::User => "user",
            Actor::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Actor::User),
            "agent" => Some(Actor::Agent),
            _ => None,
        }
    }
}

/// Classified conversational role of a turn's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// User text that starts a new unit of work.
    Command,
    /// User text replying to an agent question.
    Answer,
    /// Agent text asking the user for a decision or input.
    Question,
    /// Agent text declaring the work done.
    Completion,
    /// Agent text narrating ongoing work.
    Progress,
    /// Explicit end-of-task marker from the agent.
    EndOfTask,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Command => "command",
            Intent::Answer => "answer",
            Intent::Question => "question",
            Intent::Completion => "completion",
            Intent::Progress => "progress",
            Intent::EndOfTask => "end_of_task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "command" => Some(Intent::Command),
            "answer" => Some(Intent::Answer),
            "question" => Some(Intent::Question),
            "completion" => Some(Intent::Completion),
            "progress" => Some(Intent::Progress),
            "end_of_task" => Some(Intent::EndOfTask),
            _ => None,
        }
    }

    /// Whether this intent terminates a task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Intent::Completion | Intent::EndOfTask)
    }
}

/// The five-state task lifecycle.
///
/// `Complete` is terminal: a completed task is never reopened — the next
/// user command starts a fresh task at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Commanded,
    Processing,
    AwaitingInput,
    Complete,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Commanded => "commanded",
            TaskState::Processing => "processing",
            TaskState::AwaitingInput => "awaiting_input",
            TaskState::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(TaskState::Idle),
            "commanded" => Some(TaskState::Commanded),
            "processing" => Some(TaskState::Processing),
            "awaiting_input" => Some(TaskState::AwaitingInput),
            "complete" => Some(TaskState::Complete),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, TaskState::Complete)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One monitored coding session. Created only by the session correlator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub project_id: String,
    /// Opaque external session identifier (hook payload `session_id`).
    pub session_id: String,
    /// Stable external identity hint, when the session embeds one.
    pub run_id: Option<String>,
    /// Terminal pane locator for focus/injection integrations.
    pub pane_id: Option<String>,
    /// Absolute path to the session's append-only transcript log.
    pub transcript_path: Option<String>,
    pub created_at: i64,
    pub last_seen_at: i64,
    pub ended_at: Option<i64>,
}

/// One sequential unit of work within an agent's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub agent_id: String,
    pub state: TaskState,
    /// Set at creation from the opening user command; immutable thereafter.
    /// `None` only on the inferred-creation path (see lifecycle manager).
    pub instruction: Option<String>,
    /// Set once, on the terminal transition.
    pub summary: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

/// One exchange within a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub task_id: String,
    pub actor: Actor,
    pub intent: Intent,
    pub text: String,
    pub summary: Option<String>,
    /// Numeric frustration score; only meaningful for user turns.
    pub frustration: Option<f64>,
    /// Provisional (server receipt time) until reconciliation corrects it.
    pub timestamp: i64,
    /// Whether the timestamp has been corrected against the transcript log.
    pub authoritative: bool,
}

/// Append-only audit record. Never mutated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: i64,
    pub kind: String,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub turn_id: Option<String>,
    pub detail: String,
    pub created_at: i64,
}
