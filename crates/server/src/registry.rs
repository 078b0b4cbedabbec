// crates/server/src/registry.rs
//! In-memory cache of live agent identities.
//!
//! The database remains the source of truth; this map is a cache-aside
//! layer so the hot hook path resolves session_id -> agent_id without a
//! query. Entries are inserted by the correlator and evicted on session
//! end or reaping.

use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Indexes {
    by_session: HashMap<String, String>,
    by_run: HashMap<String, String>,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Indexes>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn agent_for_session(&self, session_id: &str) -> Option<String> {
        self.inner.read().await.by_session.get(session_id).cloned()
    }

    pub async fn agent_for_run(&self, run_id: &str) -> Option<String> {
        self.inner.read().await.by_run.get(run_id).cloned()
    }

    /// Insert or update the indexes for a live agent. Replaces any stale
    /// mapping for the same session id.
    pub async fn insert(&self, agent_id: &str, session_id: &str, run_id: Option<&str>) {
        let mut inner = self.inner.write().await;
        inner
            .by_session
            .insert(session_id.to_string(), agent_id.to_string());
        if let Some(run) = run_id {
            inner.by_run.insert(run.to_string(), agent_id.to_string());
        }
    }

    /// Evict every index entry pointing at `agent_id`.
    pub async fn remove_agent(&self, agent_id: &str) {
        let mut inner = self.inner.write().await;
        inner.by_session.retain(|_, v| v != agent_id);
        inner.by_run.retain(|_, v| v != agent_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_session.len()
    }
}
