// crates/db/src/queries/events.rs
//! Append-only audit trail. Events reference agents/tasks/turns by id but
//! carry no foreign keys so the audit survives row deletion.

use crate::Database;
use sqlx::Row;
use taskdeck_core::types::EventRecord;

/// An event about to be appended; the row id is assigned by the database.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub kind: String,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub turn_id: Option<String>,
    pub detail: String,
}

impl NewEvent {
    pub fn new(kind: &str) -> Self {
        Self { kind: kind.to_string(), ..Default::default() }
    }

    pub fn agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn turn(mut self, turn_id: &str) -> Self {
        self.turn_id = Some(turn_id.to_string());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<EventRecord, sqlx::Error> {
    Ok(EventRecord {
        id: row.try_get("id")?,
        kind: row.try_get("kind")?,
        agent_id: row.try_get("agent_id")?,
        task_id: row.try_get("task_id")?,
        turn_id: row.try_get("turn_id")?,
        detail: row.try_get("detail")?,
        created_at: row.try_get("created_at")?,
    })
}

const EVENT_COLS: &str = "id, kind, agent_id, task_id, turn_id, detail, created_at";

pub async fn append(db: &Database, event: NewEvent, now: i64) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO events (kind, agent_id, task_id, turn_id, detail, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.kind)
    .bind(&event.agent_id)
    .bind(&event.task_id)
    .bind(&event.turn_id)
    .bind(&event.detail)
    .bind(now)
    .execute(db.pool())
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_recent(db: &Database, limit: i64) -> Result<Vec<EventRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {EVENT_COLS} FROM events ORDER BY id DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(db.pool())
    .await?;
    rows.iter().map(event_from_row).collect()
}

pub async fn list_for_agent(
    db: &Database,
    agent_id: &str,
    limit: i64,
) -> Result<Vec<EventRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {EVENT_COLS} FROM events WHERE agent_id = ? ORDER BY id DESC LIMIT ?"
    ))
    .bind(agent_id)
    .bind(limit)
    .fetch_all(db.pool())
    .await?;
    rows.iter().map(event_from_row).collect()
}
