// crates/server/src/correlate.rs
//! Session correlator: maps an incoming hook payload to exactly one agent.
//!
//! Resolution is an ordered cascade, cheapest first:
//! 1. registry cache by session id
//! 2. database live-agent lookup by session id
//! 3. database live-agent lookup by run-id hint (session id rotated)
//! 4. project lookup by working directory, creating a new agent under the
//!    matched project
//!
//! When no registered project root contains the working directory the event
//! is rejected with 404 and nothing is created. Every successful resolution
//! refreshes `last_seen_at` and records any locators the payload carries.

use taskdeck_core::types::Agent;
use taskdeck_db::queries::events::NewEvent;
use taskdeck_db::{agents, events, projects};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::live::LifecycleEvent;
use crate::state::AppState;

/// Identity fields extracted from a hook payload.
#[derive(Debug, Clone, Default)]
pub struct SessionIdentity<'a> {
    pub session_id: &'a str,
    pub run_id: Option<&'a str>,
    pub cwd: Option<&'a str>,
    pub transcript_path: Option<&'a str>,
    pub pane_id: Option<&'a str>,
}

/// Resolve the payload to a live agent, creating one if this is the first
/// event from a session in a registered project.
pub async fn resolve_agent(
    state: &AppState,
    identity: &SessionIdentity<'_>,
    now: i64,
) -> ApiResult<Agent> {
    // Strategy 1: registry cache.
    if let Some(agent_id) = state.registry.agent_for_session(identity.session_id).await {
        if let Some(agent) = agents::get(&state.db, &agent_id).await? {
            if agent.ended_at.is_none() {
                return refreshed(state, agent, identity, now).await;
            }
        }
        // Stale cache entry; fall through to the database.
        state.registry.remove_agent(&agent_id).await;
    }

    // Strategy 2: live agent by session id.
    if let Some(agent) = agents::get_live_by_session(&state.db, identity.session_id).await? {
        state
            .registry
            .insert(&agent.id, &agent.session_id, agent.run_id.as_deref())
            .await;
        return refreshed(state, agent, identity, now).await;
    }

    // Strategy 3: the session id rotated (clear/resume) but the payload
    // still carries the stable run id. Rebind the agent to the new session.
    if let Some(run_id) = identity.run_id {
        if let Some(mut agent) = agents::get_live_by_run_id(&state.db, run_id).await? {
            tracing::info!(
                agent_id = %agent.id,
                old_session = %agent.session_id,
                new_session = %identity.session_id,
                "session id rotated; rebinding agent"
            );
            agents::update_session_id(&state.db, &agent.id, identity.session_id).await?;
            agent.session_id = identity.session_id.to_string();
            state
                .registry
                .insert(&agent.id, identity.session_id, Some(run_id))
                .await;
            return refreshed(state, agent, identity, now).await;
        }
    }

    // Strategy 4: new session. The working directory must fall under a
    // registered project root; otherwise the event is rejected unchanged.
    let cwd = identity
        .cwd
        .ok_or_else(|| ApiError::BadRequest("unknown session and no cwd to correlate by".into()))?;
    let project = projects::find_for_cwd(&state.db, cwd)
        .await?
        .ok_or_else(|| ApiError::UnregisteredProject(cwd.to_string()))?;

    let agent = Agent {
        id: Uuid::new_v4().to_string(),
        project_id: project.id.clone(),
        session_id: identity.session_id.to_string(),
        run_id: identity.run_id.map(str::to_string),
        pane_id: identity.pane_id.map(str::to_string),
        transcript_path: identity.transcript_path.map(str::to_string),
        created_at: now,
        last_seen_at: now,
        ended_at: None,
    };
    agents::insert(&state.db, &agent).await?;
    state
        .registry
        .insert(&agent.id, &agent.session_id, agent.run_id.as_deref())
        .await;
    events::append(
        &state.db,
        NewEvent::new("agent_started")
            .agent(&agent.id)
            .detail(format!("project {} session {}", project.name, agent.session_id)),
        now,
    )
    .await?;
    let _ = state.events_tx.send(LifecycleEvent::AgentStarted {
        agent_id: agent.id.clone(),
    });
    tracing::info!(
        agent_id = %agent.id,
        project = %project.name,
        session_id = %agent.session_id,
        "agent correlated to new session"
    );
    Ok(agent)
}

/// Touch activity time and absorb any locators the payload carries.
async fn refreshed(
    state: &AppState,
    mut agent: Agent,
    identity: &SessionIdentity<'_>,
    now: i64,
) -> ApiResult<Agent> {
    agents::touch_last_seen(&state.db, &agent.id, now).await?;
    agent.last_seen_at = now;

    let new_transcript = identity
        .transcript_path
        .filter(|_| agent.transcript_path.is_none());
    let new_pane = identity.pane_id.filter(|_| agent.pane_id.is_none());
    if new_transcript.is_some() || new_pane.is_some() {
        agents::update_locators(&state.db, &agent.id, new_transcript, new_pane).await?;
        agent.transcript_path = agent
            .transcript_path
            .or(new_transcript.map(str::to_string));
        agent.pane_id = agent.pane_id.or(new_pane.map(str::to_string));
    }
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdeck_db::{now_millis, Database};

    async fn setup() -> std::sync::Arc<AppState> {
        let db = Database::new_in_memory().await.unwrap();
        projects::insert(
            &db,
            &projects::ProjectRow {
                id: "p1".into(),
                name: "app".into(),
                root_path: "/work/app".into(),
                created_at: now_millis(),
            },
        )
        .await
        .unwrap();
        AppState::new(db, None)
    }

    fn identity<'a>(session_id: &'a str, cwd: &'a str) -> SessionIdentity<'a> {
        SessionIdentity {
            session_id,
            cwd: Some(cwd),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_creates_agent_for_registered_cwd() {
        let state = setup().await;

        let agent = resolve_agent(&state, &identity("s1", "/work/app/src"), 1000)
            .await
            .unwrap();
        assert_eq!(agent.project_id, "p1");
        assert_eq!(state.registry.len().await, 1);

        // Second event for the same session resolves to the same agent.
        let again = resolve_agent(&state, &identity("s1", "/work/app/src"), 2000)
            .await
            .unwrap();
        assert_eq!(again.id, agent.id);
        assert_eq!(again.last_seen_at, 2000);
    }

    #[tokio::test]
    async fn test_unregistered_cwd_rejected_without_side_effects() {
        let state = setup().await;

        let err = resolve_agent(&state, &identity("s1", "/elsewhere/repo"), 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnregisteredProject(_)));

        assert!(agents::list_live(&state.db).await.unwrap().is_empty());
        assert_eq!(state.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_db_fallback_when_cache_cold() {
        let state = setup().await;
        let agent = resolve_agent(&state, &identity("s1", "/work/app"), 1000)
            .await
            .unwrap();

        // Simulate a restarted server: empty registry, live row in the db.
        state.registry.remove_agent(&agent.id).await;
        let resolved = resolve_agent(&state, &identity("s1", "/work/app"), 2000)
            .await
            .unwrap();
        assert_eq!(resolved.id, agent.id);
        assert_eq!(state.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_run_id_survives_session_rotation() {
        let state = setup().await;
        let first = SessionIdentity {
            session_id: "s1",
            run_id: Some("run-7"),
            cwd: Some("/work/app"),
            ..Default::default()
        };
        let agent = resolve_agent(&state, &first, 1000).await.unwrap();

        // The session was cleared: new session id, same run id, and the
        // registry has no entry for the new id.
        let rotated = SessionIdentity {
            session_id: "s2",
            run_id: Some("run-7"),
            cwd: Some("/work/app"),
            ..Default::default()
        };
        let resolved = resolve_agent(&state, &rotated, 2000).await.unwrap();
        assert_eq!(resolved.id, agent.id);
        assert_eq!(resolved.session_id, "s2");

        let from_db = agents::get_live_by_session(&state.db, "s2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from_db.id, agent.id);
    }

    #[tokio::test]
    async fn test_locators_recorded_once() {
        let state = setup().await;
        resolve_agent(&state, &identity("s1", "/work/app"), 1000)
            .await
            .unwrap();

        let with_locators = SessionIdentity {
            session_id: "s1",
            transcript_path: Some("/logs/s1.jsonl"),
            pane_id: Some("%3"),
            ..Default::default()
        };
        let agent = resolve_agent(&state, &with_locators, 2000).await.unwrap();
        assert_eq!(agent.transcript_path.as_deref(), Some("/logs/s1.jsonl"));
        assert_eq!(agent.pane_id.as_deref(), Some("%3"));

        // Later payloads with different locators do not overwrite.
        let other = SessionIdentity {
            session_id: "s1",
            transcript_path: Some("/logs/other.jsonl"),
            ..Default::default()
        };
        let agent = resolve_agent(&state, &other, 3000).await.unwrap();
        assert_eq!(agent.transcript_path.as_deref(), Some("/logs/s1.jsonl"));
    }

    #[tokio::test]
    async fn test_unknown_session_without_cwd_is_bad_request() {
        let state = setup().await;
        let bare = SessionIdentity {
            session_id: "s1",
            ..Default::default()
        };
        let err = resolve_agent(&state, &bare, 1000).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
