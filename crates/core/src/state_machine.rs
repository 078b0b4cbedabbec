// crates/core/src/state_machine.rs
//! The task lifecycle state machine.
//!
//! This is the SOLE authority for task state transitions. It is a pure
//! function over `(current_state, actor, intent)` — no I/O, no stored state.
//! Callers that receive `None` keep the current state, still record the
//! turn, and log the anomaly; an unlisted triple is never fatal.

use crate::types::{Actor, Intent, TaskState};

/// Return the next task state for a `(state, actor, intent)` triple, or
/// `None` when the table has no rule for it.
///
/// `Complete` is terminal: no triple transitions out of it. A subsequent
/// user command starts a *new* task (at `Idle`), which is the caller's
/// responsibility, not this function's.
pub fn next_state(current: TaskState, actor: Actor, intent: Intent) -> Option<TaskState> {
    use Actor::*;
    use Intent::*;
    use TaskState::*;

    match (current, actor, intent) {
        (Idle, User, Command) => Some(Commanded),

        (Commanded, Agent, Progress) => Some(Processing),
        (Commanded, Agent, Question) => Some(AwaitingInput),
        (Commanded, Agent, Completion | EndOfTask) => Some(Complete),

        (Processing, Agent, Progress) => Some(Processing),
        (Processing, Agent, Question) => Some(AwaitingInput),
        (Processing, Agent, Completion | EndOfTask) => Some(Complete),
        (Processing, User, Answer) => Some(Processing),

        (AwaitingInput, User, Answer) => Some(Processing),
        (AwaitingInput, Agent, Completion | EndOfTask) => Some(Complete),

        _ => None,
    }
}
