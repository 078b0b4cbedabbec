// crates/db/src/queries/tasks.rs
//! Task persistence. All writes flow through the lifecycle manager, which
//! holds the per-agent lock while calling in here.

use crate::queries::decode_enum;
use crate::Database;
use sqlx::Row;
use taskdeck_core::types::{Task, TaskState};

pub(crate) fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Task, sqlx::Error> {
    Ok(Task {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        state: decode_enum(row, "state", TaskState::parse)?,
        instruction: row.try_get("instruction")?,
        summary: row.try_get("summary")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

const TASK_COLS: &str = "id, agent_id, state, instruction, summary, started_at, completed_at";

pub async fn insert(db: &Database, task: &Task) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tasks (id, agent_id, state, instruction, summary, started_at, completed_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&task.id)
    .bind(&task.agent_id)
    .bind(task.state.as_str())
    .bind(&task.instruction)
    .bind(&task.summary)
    .bind(task.started_at)
    .bind(task.completed_at)
    .execute(db.pool())
    .await?;
    Ok(())
}

pub async fn get(db: &Database, id: &str) -> Result<Option<Task>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?"))
        .bind(id)
        .fetch_optional(db.pool())
        .await?;
    row.as_ref().map(task_from_row).transpose()
}

/// The single open (non-complete) task for an agent, if any.
pub async fn open_for_agent(db: &Database, agent_id: &str) -> Result<Option<Task>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {TASK_COLS} FROM tasks WHERE agent_id = ? AND state != 'complete'"
    ))
    .bind(agent_id)
    .fetch_optional(db.pool())
    .await?;
    row.as_ref().map(task_from_row).transpose()
}

/// The agent's most recently started task, open or complete.
pub async fn latest_for_agent(db: &Database, agent_id: &str) -> Result<Option<Task>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {TASK_COLS} FROM tasks WHERE agent_id = ? ORDER BY started_at DESC, id DESC LIMIT 1"
    ))
    .bind(agent_id)
    .fetch_optional(db.pool())
    .await?;
    row.as_ref().map(task_from_row).transpose()
}

pub async fn list_for_agent(db: &Database, agent_id: &str) -> Result<Vec<Task>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {TASK_COLS} FROM tasks WHERE agent_id = ? ORDER BY started_at"
    ))
    .bind(agent_id)
    .fetch_all(db.pool())
    .await?;
    rows.iter().map(task_from_row).collect()
}

pub async fn update_state(db: &Database, id: &str, state: TaskState) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE tasks SET state = ? WHERE id = ?")
        .bind(state.as_str())
        .bind(id)
        .execute(db.pool())
        .await?;
    Ok(())
}

/// Terminal transition: set state, completion time, and (later) summary.
pub async fn complete(db: &Database, id: &str, completed_at: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE tasks SET state = 'complete', completed_at = ? WHERE id = ?")
        .bind(completed_at)
        .bind(id)
        .execute(db.pool())
        .await?;
    Ok(())
}

pub async fn set_summary(db: &Database, id: &str, summary: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE tasks SET summary = ? WHERE id = ?")
        .bind(summary)
        .bind(id)
        .execute(db.pool())
        .await?;
    Ok(())
}

/// Fill the instruction only when it is still NULL (inferred-creation
/// recovery: the instruction is immutable once set).
pub async fn set_instruction_if_missing(
    db: &Database,
    id: &str,
    instruction: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE tasks SET instruction = ? WHERE id = ? AND instruction IS NULL")
        .bind(instruction)
        .bind(id)
        .execute(db.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}
