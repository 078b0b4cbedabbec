/// Inline SQL migrations for the taskdeck schema.
///
/// Simple inline migrations rather than sqlx migration files — the schema
/// is small and self-contained. Timestamps are unix millis throughout.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: projects table — manually registered, never auto-created
    // by correlation.
    r#"
CREATE TABLE IF NOT EXISTS projects (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    root_path  TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);
"#,
    // Migration 2: agents table
    r#"
CREATE TABLE IF NOT EXISTS agents (
    id              TEXT PRIMARY KEY,
    project_id      TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    session_id      TEXT NOT NULL,
    run_id          TEXT,
    pane_id         TEXT,
    transcript_path TEXT,
    created_at      INTEGER NOT NULL,
    last_seen_at    INTEGER NOT NULL,
    ended_at        INTEGER
);
"#,
    // At most one live agent per external session identifier.
    r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_agents_live_session
    ON agents(session_id) WHERE ended_at IS NULL;
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_agents_run_id ON agents(run_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_agents_last_seen ON agents(last_seen_at);"#,
    // Migration 3: tasks table
    r#"
CREATE TABLE IF NOT EXISTS tasks (
    id           TEXT PRIMARY KEY,
    agent_id     TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    state        TEXT NOT NULL CHECK (state IN
                   ('idle','commanded','processing','awaiting_input','complete')),
    instruction  TEXT,
    summary      TEXT,
    started_at   INTEGER NOT NULL,
    completed_at INTEGER
);
"#,
    // At most one open task per agent.
    r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_open_agent
    ON tasks(agent_id) WHERE state != 'complete';
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_tasks_agent ON tasks(agent_id, started_at);"#,
    // Migration 4: turns table
    r#"
CREATE TABLE IF NOT EXISTS turns (
    id            TEXT PRIMARY KEY,
    task_id       TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    actor         TEXT NOT NULL CHECK (actor IN ('user','agent')),
    intent        TEXT NOT NULL CHECK (intent IN
                    ('command','answer','question','completion','progress','end_of_task')),
    text          TEXT NOT NULL,
    summary       TEXT,
    frustration   REAL,
    timestamp     INTEGER NOT NULL,
    authoritative INTEGER NOT NULL DEFAULT 0,
    dedup_key     TEXT NOT NULL
);
"#,
    // Idempotency: structurally-identical duplicate signals collide here
    // and are absorbed as no-ops.
    r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_turns_dedup ON turns(dedup_key);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_turns_task ON turns(task_id, timestamp);"#,
    // Migration 5: events audit trail — append-only, no cascade (audit
    // survives agent deletion).
    r#"
CREATE TABLE IF NOT EXISTS events (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    kind       TEXT NOT NULL,
    agent_id   TEXT,
    task_id    TEXT,
    turn_id    TEXT,
    detail     TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_events_agent ON events(agent_id, created_at);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind, created_at);"#,
];
