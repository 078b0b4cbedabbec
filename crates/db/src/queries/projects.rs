// crates/db/src/queries/projects.rs
//! Project registry: lookup-only from the correlation path. Rows are
//! created exclusively through the operator registration endpoint — the
//! correlator never inserts here.

use crate::Database;
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub root_path: String,
    pub created_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for ProjectRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            root_path: row.try_get("root_path")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

pub async fn insert(db: &Database, project: &ProjectRow) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO projects (id, name, root_path, created_at) VALUES (?, ?, ?, ?)")
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.root_path)
        .bind(project.created_at)
        .execute(db.pool())
        .await?;
    Ok(())
}

pub async fn get(db: &Database, id: &str) -> Result<Option<ProjectRow>, sqlx::Error> {
    sqlx::query_as("SELECT id, name, root_path, created_at FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(db.pool())
        .await
}

pub async fn list(db: &Database) -> Result<Vec<ProjectRow>, sqlx::Error> {
    sqlx::query_as("SELECT id, name, root_path, created_at FROM projects ORDER BY name")
        .fetch_all(db.pool())
        .await
}

/// Find the registered project whose root path contains `cwd`.
///
/// Longest-prefix match so nested project roots resolve to the deepest
/// registration. Path-component aware: `/work/app2` does not match a
/// project rooted at `/work/app`.
pub async fn find_for_cwd(db: &Database, cwd: &str) -> Result<Option<ProjectRow>, sqlx::Error> {
    let all = list(db).await?;
    let cwd_path = std::path::Path::new(cwd);
    let mut best: Option<ProjectRow> = None;
    for project in all {
        if cwd_path.starts_with(&project.root_path) {
            match &best {
                Some(b) if b.root_path.len() >= project.root_path.len() => {}
                _ => best = Some(project),
            }
        }
    }
    Ok(best)
}
