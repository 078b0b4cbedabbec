// crates/db/src/lib.rs
//! SQLite persistence for taskdeck: projects, agents, tasks, turns, and the
//! append-only event audit trail.
//!
//! The database is the single source of truth and synchronization point;
//! the in-memory session registry in the server crate is a cache over it.

mod migrations;
pub mod queries;

pub use queries::agents;
pub use queries::events;
pub use queries::projects;
pub use queries::tasks;
pub use queries::turns;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("failed to determine data directory")]
    NoDataDir,

    #[error("failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Main database handle wrapping a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Cascading deletes (agent -> tasks -> turns) depend on this.
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;

        info!("database opened at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    ///
    /// Each call gets a uniquely named shared-cache database: the shared
    /// cache lets all pool connections see the same data (without it each
    /// connection would get its own empty database), while the unique name
    /// keeps concurrently running tests isolated from each other.
    pub async fn new_in_memory() -> DbResult<Self> {
        static NEXT_DB: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let n = NEXT_DB.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite:file:taskdeck-mem-{n}?mode=memory&cache=shared"
        ))?
        .shared_cache(true)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            // Keep one connection open: the database vanishes when its last
            // connection closes.
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open the database at the default location:
    /// `~/.local/share/taskdeck/taskdeck.db` (platform data dir).
    pub async fn open_default() -> DbResult<Self> {
        let path = default_db_path()?;
        Self::new(&path).await
    }

    /// Run all inline migrations.
    ///
    /// A `_migrations` table tracks which versions have been applied so
    /// non-idempotent statements only execute once.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1; // 1-based
            if version > current_version {
                sqlx::query(migration).execute(&self.pool).await?;
                sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Path to the database file; empty for in-memory databases.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// Returns the default database path: `<data dir>/taskdeck/taskdeck.db`
pub fn default_db_path() -> DbResult<PathBuf> {
    dirs::data_dir()
        .map(|d| d.join("taskdeck").join("taskdeck.db"))
        .ok_or(DbError::NoDataDir)
}

/// Current time as unix millis, the storage timestamp unit everywhere.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
