// crates/server/src/routes/hooks.rs
//! Hook receiver: one POST endpoint per lifecycle signal.
//!
//! Every endpoint follows the same shape: validate the payload, resolve
//! the agent through the correlator, hand off to the lifecycle manager,
//! answer `{ok: true, ...}`. Duplicates are absorbed and still answered
//! with 200; only malformed payloads (400) and unregistered projects (404)
//! are rejected.

use axum::{extract::State, response::Json, routing::post, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskdeck_core::types::{Agent, Intent, TaskState};
use taskdeck_db::queries::events::NewEvent;
use taskdeck_db::{agents, events, now_millis};

use crate::correlate::{resolve_agent, SessionIdentity};
use crate::error::{ApiError, ApiResult};
use crate::lifecycle::TurnOutcome;
use crate::live::LifecycleEvent;
use crate::state::AppState;

/// Union of the fields the hook signals carry. Unknown fields are ignored
/// so payload additions on the sender side never break delivery.
#[derive(Debug, Deserialize)]
pub struct HookPayload {
    pub session_id: String,
    pub run_id: Option<String>,
    pub cwd: Option<String>,
    pub transcript_path: Option<String>,
    pub pane_id: Option<String>,
    /// User text on `user-input`.
    pub prompt: Option<String>,
    /// Final agent text on `stop`.
    pub text: Option<String>,
    /// Question text on `notification` / `permission-request`.
    pub message: Option<String>,
    /// Tool name on `pre-tool` / `post-tool`; informational only.
    pub tool_name: Option<String>,
    /// Sender-reported reason on `session-end`.
    pub reason: Option<String>,
}

impl HookPayload {
    fn identity(&self) -> SessionIdentity<'_> {
        SessionIdentity {
            session_id: &self.session_id,
            run_id: self.run_id.as_deref(),
            cwd: self.cwd.as_deref(),
            transcript_path: self.transcript_path.as_deref(),
            pane_id: self.pane_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
}

impl HookResponse {
    fn for_agent(agent: &Agent) -> Self {
        Self {
            ok: true,
            agent_id: Some(agent.id.clone()),
            task_id: None,
            state: None,
            intent: None,
            duplicate: None,
            ignored: None,
        }
    }

    fn for_turn(agent: &Agent, outcome: TurnOutcome) -> Self {
        Self {
            ok: true,
            agent_id: Some(agent.id.clone()),
            task_id: Some(outcome.task_id),
            state: Some(outcome.state),
            intent: Some(outcome.intent),
            duplicate: outcome.duplicate.then_some(true),
            ignored: None,
        }
    }

    fn ignored() -> Self {
        Self {
            ok: true,
            agent_id: None,
            task_id: None,
            state: None,
            intent: None,
            duplicate: None,
            ignored: Some(true),
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/hooks/session-start", post(session_start))
        .route("/hooks/session-end", post(session_end))
        .route("/hooks/user-input", post(user_input))
        .route("/hooks/stop", post(stop))
        .route("/hooks/pre-tool", post(pre_tool))
        .route("/hooks/post-tool", post(post_tool))
        .route("/hooks/notification", post(notification))
        .route("/hooks/permission-request", post(permission_request))
}

async fn session_start(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HookPayload>,
) -> ApiResult<Json<HookResponse>> {
    let agent = resolve_agent(&state, &payload.identity(), now_millis()).await?;
    tracing::info!(agent_id = %agent.id, session_id = %payload.session_id, "session started");
    Ok(Json(HookResponse::for_agent(&agent)))
}

/// Session end is idempotent: ending an unknown or already-ended session
/// is acknowledged without effect.
async fn session_end(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HookPayload>,
) -> ApiResult<Json<HookResponse>> {
    let Some(agent) = agents::get_live_by_session(&state.db, &payload.session_id).await? else {
        return Ok(Json(HookResponse::ignored()));
    };
    let now = now_millis();
    agents::mark_ended(&state.db, &agent.id, now).await?;
    state.registry.remove_agent(&agent.id).await;
    state.lifecycle.forget_agent(&agent.id);
    events::append(
        &state.db,
        NewEvent::new("agent_ended")
            .agent(&agent.id)
            .detail(payload.reason.clone().unwrap_or_default()),
        now,
    )
    .await?;
    let _ = state.events_tx.send(LifecycleEvent::AgentEnded {
        agent_id: agent.id.clone(),
    });
    tracing::info!(agent_id = %agent.id, "session ended");
    Ok(Json(HookResponse::for_agent(&agent)))
}

async fn user_input(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HookPayload>,
) -> ApiResult<Json<HookResponse>> {
    let text = payload
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing field: prompt".into()))?;
    let agent = resolve_agent(&state, &payload.identity(), now_millis()).await?;
    let outcome = state
        .lifecycle
        .record_user_turn(&agent, text, now_millis())
        .await?;
    Ok(Json(HookResponse::for_turn(&agent, outcome)))
}

/// The agent finished responding. The payload usually carries the final
/// text; when it doesn't, the transcript tail provides it.
async fn stop(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HookPayload>,
) -> ApiResult<Json<HookResponse>> {
    let agent = resolve_agent(&state, &payload.identity(), now_millis()).await?;

    let text = match payload.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => t.to_string(),
        None => match last_agent_text(&agent).await {
            Some(t) => t,
            None => {
                tracing::debug!(agent_id = %agent.id, "stop with no text and no transcript tail");
                return Ok(Json(HookResponse::ignored()));
            }
        },
    };

    let outcome = state
        .lifecycle
        .record_agent_turn(&agent, &text, now_millis(), None)
        .await?;
    Ok(Json(HookResponse::for_turn(&agent, outcome)))
}

async fn pre_tool(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HookPayload>,
) -> ApiResult<Json<HookResponse>> {
    tool_activity(state, payload).await
}

async fn post_tool(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HookPayload>,
) -> ApiResult<Json<HookResponse>> {
    tool_activity(state, payload).await
}

async fn tool_activity(
    state: Arc<AppState>,
    payload: HookPayload,
) -> ApiResult<Json<HookResponse>> {
    let agent = resolve_agent(&state, &payload.identity(), now_millis()).await?;
    if let Some(tool) = &payload.tool_name {
        tracing::debug!(agent_id = %agent.id, tool = %tool, "tool activity");
    }
    let task_state = state.lifecycle.infer_processing(&agent, now_millis()).await?;
    let mut response = HookResponse::for_agent(&agent);
    response.state = Some(task_state);
    Ok(Json(response))
}

async fn notification(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HookPayload>,
) -> ApiResult<Json<HookResponse>> {
    agent_question(state, payload).await
}

async fn permission_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HookPayload>,
) -> ApiResult<Json<HookResponse>> {
    agent_question(state, payload).await
}

/// Notifications and permission requests both mean the agent is blocked on
/// the user; they route through the normal QUESTION intent path. A payload
/// with no message text still refreshes the agent's activity timestamp.
async fn agent_question(
    state: Arc<AppState>,
    payload: HookPayload,
) -> ApiResult<Json<HookResponse>> {
    let agent = resolve_agent(&state, &payload.identity(), now_millis()).await?;
    let Some(text) = payload
        .message
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    else {
        tracing::debug!(agent_id = %agent.id, "notification without message text");
        let mut response = HookResponse::for_agent(&agent);
        response.ignored = Some(true);
        return Ok(Json(response));
    };
    let outcome = state
        .lifecycle
        .record_agent_turn(&agent, text, now_millis(), Some(Intent::Question))
        .await?;
    Ok(Json(HookResponse::for_turn(&agent, outcome)))
}

/// Last meaningful agent entry in the transcript tail.
async fn last_agent_text(agent: &Agent) -> Option<String> {
    let path = agent.transcript_path.as_deref()?;
    let lines = taskdeck_core::tail::tail_lines(std::path::Path::new(path), 20)
        .await
        .ok()?;
    taskdeck_core::transcript::parse_transcript_lines(&lines)
        .into_iter()
        .rev()
        .find(|entry| entry.actor == taskdeck_core::Actor::Agent)
        .map(|entry| entry.text)
}
