// crates/server/src/routes/agents.rs
//! Read-side dashboard API: live agents with their current task, plus
//! task and turn history.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use taskdeck_core::types::{Agent, Task, Turn};
use taskdeck_db::{agents, tasks, turns};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    #[serde(flatten)]
    pub agent: Agent,
    /// The agent's open task, if any.
    pub current_task: Option<Task>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", get(list_live))
        .route("/agents/{id}/tasks", get(agent_tasks))
        .route("/tasks/{id}/turns", get(task_turns))
}

async fn list_live(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<AgentSummary>>> {
    let live = agents::list_live(&state.db).await?;
    let mut out = Vec::with_capacity(live.len());
    for agent in live {
        let current_task = tasks::open_for_agent(&state.db, &agent.id).await?;
        out.push(AgentSummary {
            agent,
            current_task,
        });
    }
    Ok(Json(out))
}

async fn agent_tasks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Task>>> {
    if agents::get(&state.db, &id).await?.is_none() {
        return Err(ApiError::AgentNotFound(id));
    }
    Ok(Json(tasks::list_for_agent(&state.db, &id).await?))
}

async fn task_turns(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Turn>>> {
    if tasks::get(&state.db, &id).await?.is_none() {
        return Err(ApiError::TaskNotFound(id));
    }
    Ok(Json(turns::list_for_task(&state.db, &id).await?))
}
