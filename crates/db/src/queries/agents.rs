// crates/db/src/queries/agents.rs
//! Agent persistence. Creation happens only in the session correlator;
//! everything else mutates activity timestamps or marks the end of life.

use crate::Database;
use sqlx::Row;
use taskdeck_core::types::Agent;

// Manual row mapping — Agent lives in taskdeck-core, which doesn't depend
// on sqlx, so FromRow can't be derived there.
pub(crate) fn agent_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Agent, sqlx::Error> {
    Ok(Agent {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        session_id: row.try_get("session_id")?,
        run_id: row.try_get("run_id")?,
        pane_id: row.try_get("pane_id")?,
        transcript_path: row.try_get("transcript_path")?,
        created_at: row.try_get("created_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

const AGENT_COLS: &str =
    "id, project_id, session_id, run_id, pane_id, transcript_path, created_at, last_seen_at, ended_at";

pub async fn insert(db: &Database, agent: &Agent) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO agents (id, project_id, session_id, run_id, pane_id, transcript_path, \
         created_at, last_seen_at, ended_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&agent.id)
    .bind(&agent.project_id)
    .bind(&agent.session_id)
    .bind(&agent.run_id)
    .bind(&agent.pane_id)
    .bind(&agent.transcript_path)
    .bind(agent.created_at)
    .bind(agent.last_seen_at)
    .bind(agent.ended_at)
    .execute(db.pool())
    .await?;
    Ok(())
}

pub async fn get(db: &Database, id: &str) -> Result<Option<Agent>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {AGENT_COLS} FROM agents WHERE id = ?"))
        .bind(id)
        .fetch_optional(db.pool())
        .await?;
    row.as_ref().map(agent_from_row).transpose()
}

/// The live (non-ended) agent for an external session id, if any.
pub async fn get_live_by_session(
    db: &Database,
    session_id: &str,
) -> Result<Option<Agent>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {AGENT_COLS} FROM agents WHERE session_id = ? AND ended_at IS NULL"
    ))
    .bind(session_id)
    .fetch_optional(db.pool())
    .await?;
    row.as_ref().map(agent_from_row).transpose()
}

/// The live agent carrying a stable external identity hint, if any.
pub async fn get_live_by_run_id(db: &Database, run_id: &str) -> Result<Option<Agent>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {AGENT_COLS} FROM agents WHERE run_id = ? AND ended_at IS NULL"
    ))
    .bind(run_id)
    .fetch_optional(db.pool())
    .await?;
    row.as_ref().map(agent_from_row).transpose()
}

/// The live agent currently writing the given transcript log, if any.
pub async fn get_live_by_transcript_path(
    db: &Database,
    transcript_path: &str,
) -> Result<Option<Agent>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {AGENT_COLS} FROM agents WHERE transcript_path = ? AND ended_at IS NULL"
    ))
    .bind(transcript_path)
    .fetch_optional(db.pool())
    .await?;
    row.as_ref().map(agent_from_row).transpose()
}

pub async fn list_live(db: &Database) -> Result<Vec<Agent>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {AGENT_COLS} FROM agents WHERE ended_at IS NULL ORDER BY last_seen_at DESC"
    ))
    .fetch_all(db.pool())
    .await?;
    rows.iter().map(agent_from_row).collect()
}

pub async fn touch_last_seen(db: &Database, id: &str, now: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE agents SET last_seen_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(db.pool())
        .await?;
    Ok(())
}

/// Rebind an agent to a rotated session identifier. Happens when a session
/// is cleared or resumed under a new id but carries the same run id.
pub async fn update_session_id(
    db: &Database,
    id: &str,
    session_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE agents SET session_id = ? WHERE id = ?")
        .bind(session_id)
        .bind(id)
        .execute(db.pool())
        .await?;
    Ok(())
}

/// Record the transcript path / pane locator the first time a hook payload
/// carries them.
pub async fn update_locators(
    db: &Database,
    id: &str,
    transcript_path: Option<&str>,
    pane_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE agents SET transcript_path = COALESCE(?, transcript_path), \
         pane_id = COALESCE(?, pane_id) WHERE id = ?",
    )
    .bind(transcript_path)
    .bind(pane_id)
    .bind(id)
    .execute(db.pool())
    .await?;
    Ok(())
}

/// Mark an agent ended. Task/turn history is retained.
pub async fn mark_ended(db: &Database, id: &str, now: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE agents SET ended_at = ? WHERE id = ? AND ended_at IS NULL")
        .bind(now)
        .bind(id)
        .execute(db.pool())
        .await?;
    Ok(())
}

/// End every live agent not seen since `cutoff`. Returns the reaped agents.
pub async fn reap_inactive(db: &Database, cutoff: i64, now: i64) -> Result<Vec<Agent>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {AGENT_COLS} FROM agents WHERE ended_at IS NULL AND last_seen_at < ?"
    ))
    .bind(cutoff)
    .fetch_all(db.pool())
    .await?;
    let stale: Vec<Agent> = rows.iter().map(agent_from_row).collect::<Result<_, _>>()?;

    for agent in &stale {
        mark_ended(db, &agent.id, now).await?;
    }
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::projects::{self, ProjectRow};
    use crate::now_millis;

    async fn seed(db: &Database) {
        projects::insert(
            db,
            &ProjectRow {
                id: "p1".into(),
                name: "app".into(),
                root_path: "/work/app".into(),
                created_at: now_millis(),
            },
        )
        .await
        .unwrap();
    }

    fn agent(id: &str, session: &str, seen: i64) -> Agent {
        Agent {
            id: id.into(),
            project_id: "p1".into(),
            session_id: session.into(),
            run_id: None,
            pane_id: None,
            transcript_path: None,
            created_at: seen,
            last_seen_at: seen,
            ended_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = Database::new_in_memory().await.unwrap();
        seed(&db).await;
        insert(&db, &agent("a1", "s1", 1000)).await.unwrap();

        let found = get_live_by_session(&db, "s1").await.unwrap().expect("live");
        assert_eq!(found.id, "a1");
        assert!(get_live_by_session(&db, "s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_live_agent_per_session() {
        let db = Database::new_in_memory().await.unwrap();
        seed(&db).await;
        insert(&db, &agent("a1", "s1", 1000)).await.unwrap();
        // Second live agent for the same session violates the partial
        // unique index.
        assert!(insert(&db, &agent("a2", "s1", 2000)).await.is_err());

        // After the first ends, a new one may start.
        mark_ended(&db, "a1", 3000).await.unwrap();
        insert(&db, &agent("a2", "s1", 4000)).await.unwrap();
        let found = get_live_by_session(&db, "s1").await.unwrap().expect("live");
        assert_eq!(found.id, "a2");
    }

    #[tokio::test]
    async fn test_run_id_lookup() {
        let db = Database::new_in_memory().await.unwrap();
        seed(&db).await;
        let mut a = agent("a1", "s1", 1000);
        a.run_id = Some("run-123".into());
        insert(&db, &a).await.unwrap();

        let found = get_live_by_run_id(&db, "run-123").await.unwrap().expect("live");
        assert_eq!(found.id, "a1");
    }

    #[tokio::test]
    async fn test_reap_inactive() {
        let db = Database::new_in_memory().await.unwrap();
        seed(&db).await;
        insert(&db, &agent("old", "s1", 1000)).await.unwrap();
        insert(&db, &agent("fresh", "s2", 9000)).await.unwrap();

        let reaped = reap_inactive(&db, 5000, 10_000).await.unwrap();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].id, "old");

        assert!(get_live_by_session(&db, "s1").await.unwrap().is_none());
        assert!(get_live_by_session(&db, "s2").await.unwrap().is_some());
        // Ended agent is still retrievable by id.
        assert!(get(&db, "old").await.unwrap().expect("row").ended_at.is_some());
    }

    #[tokio::test]
    async fn test_update_locators_keeps_existing() {
        let db = Database::new_in_memory().await.unwrap();
        seed(&db).await;
        insert(&db, &agent("a1", "s1", 1000)).await.unwrap();

        update_locators(&db, "a1", Some("/tmp/t.jsonl"), None).await.unwrap();
        update_locators(&db, "a1", None, Some("%5")).await.unwrap();

        let found = get(&db, "a1").await.unwrap().expect("row");
        assert_eq!(found.transcript_path.as_deref(), Some("/tmp/t.jsonl"));
        assert_eq!(found.pane_id.as_deref(), Some("%5"));
    }
}
