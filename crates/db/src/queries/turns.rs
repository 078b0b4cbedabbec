// crates/db/src/queries/turns.rs
//! Turn persistence. Inserts are idempotent: the dedup key absorbs
//! structurally-identical duplicate deliveries at the unique index.

use crate::queries::decode_enum;
use crate::Database;
use sqlx::Row;
use taskdeck_core::types::{Actor, Intent, Turn};

pub(crate) fn turn_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, sqlx::Error> {
    Ok(Turn {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        actor: decode_enum(row, "actor", Actor::parse)?,
        intent: decode_enum(row, "intent", Intent::parse)?,
        text: row.try_get("text")?,
        summary: row.try_get("summary")?,
        frustration: row.try_get("frustration")?,
        timestamp: row.try_get("timestamp")?,
        authoritative: row.try_get::<i64, _>("authoritative")? != 0,
    })
}

const TURN_COLS: &str =
    "id, task_id, actor, intent, text, summary, frustration, timestamp, authoritative";

/// Insert a turn, absorbing duplicates via the dedup key. Returns true if
/// the row was actually written, false if an identical turn already existed.
pub async fn insert(db: &Database, turn: &Turn, dedup_key: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO turns (id, task_id, actor, intent, text, summary, frustration, \
         timestamp, authoritative, dedup_key) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(dedup_key) DO NOTHING",
    )
    .bind(&turn.id)
    .bind(&turn.task_id)
    .bind(turn.actor.as_str())
    .bind(turn.intent.as_str())
    .bind(&turn.text)
    .bind(&turn.summary)
    .bind(turn.frustration)
    .bind(turn.timestamp)
    .bind(turn.authoritative as i64)
    .bind(dedup_key)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<Turn>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {TURN_COLS} FROM turns WHERE id = ?"))
        .bind(id)
        .fetch_optional(db.pool())
        .await?;
    row.as_ref().map(turn_from_row).transpose()
}

pub async fn list_for_task(db: &Database, task_id: &str) -> Result<Vec<Turn>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {TURN_COLS} FROM turns WHERE task_id = ? ORDER BY timestamp, id"
    ))
    .bind(task_id)
    .fetch_all(db.pool())
    .await?;
    rows.iter().map(turn_from_row).collect()
}

pub async fn count_for_task(db: &Database, task_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM turns WHERE task_id = ?")
        .bind(task_id)
        .fetch_one(db.pool())
        .await?;
    row.try_get("n")
}

/// Timestamp of the task's newest recorded turn, if it has any.
pub async fn newest_timestamp_for_task(
    db: &Database,
    task_id: &str,
) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query("SELECT MAX(timestamp) AS ts FROM turns WHERE task_id = ?")
        .bind(task_id)
        .fetch_one(db.pool())
        .await?;
    row.try_get("ts")
}

/// Promote a provisional turn with the transcript's authoritative timestamp.
pub async fn promote(db: &Database, id: &str, timestamp: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE turns SET timestamp = ?, authoritative = 1 WHERE id = ?")
        .bind(timestamp)
        .bind(id)
        .execute(db.pool())
        .await?;
    Ok(())
}

/// Find an existing turn with identical content for this agent and actor
/// within `window_ms` of `ts`. Used to absorb duplicate deliveries whose
/// receipt times straddle a dedup-key timing bucket boundary.
pub async fn find_recent_identical(
    db: &Database,
    agent_id: &str,
    actor: Actor,
    text: &str,
    ts: i64,
    window_ms: i64,
) -> Result<Option<Turn>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT t.{} FROM turns t \
         JOIN tasks k ON k.id = t.task_id \
         WHERE k.agent_id = ? AND t.actor = ? AND t.text = ? \
           AND t.timestamp BETWEEN ? AND ? \
         ORDER BY ABS(t.timestamp - ?) LIMIT 1",
        TURN_COLS.replace(", ", ", t.")
    ))
    .bind(agent_id)
    .bind(actor.as_str())
    .bind(text)
    .bind(ts - window_ms)
    .bind(ts + window_ms)
    .bind(ts)
    .fetch_optional(db.pool())
    .await?;
    row.as_ref().map(turn_from_row).transpose()
}

/// Provisional (hook-recorded, not yet transcript-confirmed) turns for an
/// agent and actor whose timestamp falls inside the match window.
pub async fn provisional_in_window(
    db: &Database,
    agent_id: &str,
    actor: Actor,
    from: i64,
    to: i64,
) -> Result<Vec<Turn>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT t.{} FROM turns t \
         JOIN tasks k ON k.id = t.task_id \
         WHERE k.agent_id = ? AND t.actor = ? AND t.authoritative = 0 \
           AND t.timestamp BETWEEN ? AND ? \
         ORDER BY t.timestamp",
        TURN_COLS.replace(", ", ", t.")
    ))
    .bind(agent_id)
    .bind(actor.as_str())
    .bind(from)
    .bind(to)
    .fetch_all(db.pool())
    .await?;
    rows.iter().map(turn_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::now_millis;
    use pretty_assertions::assert_eq;
    use crate::queries::{agents, projects, tasks};
    use taskdeck_core::types::{Agent, Task, TaskState};

    async fn seed_task(db: &Database) -> String {
        projects::insert(
            db,
            &projects::ProjectRow {
                id: "p1".into(),
                name: "app".into(),
                root_path: "/work/app".into(),
                created_at: now_millis(),
            },
        )
        .await
        .unwrap();
        agents::insert(
            db,
            &Agent {
                id: "a1".into(),
                project_id: "p1".into(),
                session_id: "s1".into(),
                run_id: None,
                pane_id: None,
                transcript_path: None,
                created_at: 1000,
                last_seen_at: 1000,
                ended_at: None,
            },
        )
        .await
        .unwrap();
        let task = Task {
            id: "t1".into(),
            agent_id: "a1".into(),
            state: TaskState::Commanded,
            instruction: Some("implement X".into()),
            summary: None,
            started_at: 1000,
            completed_at: None,
        };
        tasks::insert(db, &task).await.unwrap();
        task.id
    }

    fn turn(id: &str, task_id: &str, ts: i64) -> Turn {
        Turn {
            id: id.into(),
            task_id: task_id.into(),
            actor: Actor::User,
            intent: Intent::Command,
            text: "implement X".into(),
            summary: None,
            frustration: None,
            timestamp: ts,
            authoritative: false,
        }
    }

    #[tokio::test]
    async fn test_duplicate_dedup_key_absorbed() {
        let db = Database::new_in_memory().await.unwrap();
        let task_id = seed_task(&db).await;

        assert!(insert(&db, &turn("u1", &task_id, 1000), "key-1").await.unwrap());
        // Same dedup key, different row id: absorbed as a no-op.
        assert!(!insert(&db, &turn("u2", &task_id, 1050), "key-1").await.unwrap());

        assert_eq!(count_for_task(&db, &task_id).await.unwrap(), 1);
        assert!(get(&db, "u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_promote_marks_authoritative() {
        let db = Database::new_in_memory().await.unwrap();
        let task_id = seed_task(&db).await;
        insert(&db, &turn("u1", &task_id, 1000), "key-1").await.unwrap();

        promote(&db, "u1", 950).await.unwrap();
        let row = get(&db, "u1").await.unwrap().expect("row");
        assert!(row.authoritative);
        assert_eq!(row.timestamp, 950);
    }

    #[tokio::test]
    async fn test_provisional_window_filters() {
        let db = Database::new_in_memory().await.unwrap();
        let task_id = seed_task(&db).await;
        insert(&db, &turn("in", &task_id, 1000), "k1").await.unwrap();
        insert(&db, &turn("late", &task_id, 500_000), "k2").await.unwrap();
        let mut agent_turn = turn("agent", &task_id, 1000);
        agent_turn.actor = Actor::Agent;
        agent_turn.intent = Intent::Progress;
        insert(&db, &agent_turn, "k3").await.unwrap();
        promote(&db, "in", 1000).await.unwrap();

        // "in" is now authoritative, "late" is outside the window, "agent"
        // has the wrong actor.
        let got = provisional_in_window(&db, "a1", Actor::User, 0, 10_000).await.unwrap();
        assert!(got.is_empty());

        insert(&db, &turn("fresh", &task_id, 2000), "k4").await.unwrap();
        let got = provisional_in_window(&db, "a1", Actor::User, 0, 10_000).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "fresh");
    }

    #[tokio::test]
    async fn test_newest_timestamp_for_task() {
        let db = Database::new_in_memory().await.unwrap();
        let task_id = seed_task(&db).await;
        assert!(newest_timestamp_for_task(&db, &task_id).await.unwrap().is_none());

        insert(&db, &turn("a", &task_id, 1000), "k1").await.unwrap();
        insert(&db, &turn("b", &task_id, 3000), "k2").await.unwrap();
        assert_eq!(
            newest_timestamp_for_task(&db, &task_id).await.unwrap(),
            Some(3000)
        );
    }

    #[tokio::test]
    async fn test_list_ordered_by_timestamp() {
        let db = Database::new_in_memory().await.unwrap();
        let task_id = seed_task(&db).await;
        insert(&db, &turn("b", &task_id, 2000), "k1").await.unwrap();
        insert(&db, &turn("a", &task_id, 1000), "k2").await.unwrap();

        let got = list_for_task(&db, &task_id).await.unwrap();
        assert_eq!(got.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), ["a", "b"]);
    }
}
