// crates/server/src/routes/projects.rs
//! Operator project registration. This is the only code path that creates
//! project rows; correlation only ever reads them.

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskdeck_db::{now_millis, projects};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProject {
    pub name: String,
    pub root_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub id: String,
    pub name: String,
    pub root_path: String,
    pub created_at: i64,
}

impl From<projects::ProjectRow> for ProjectView {
    fn from(row: projects::ProjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            root_path: row.root_path,
            created_at: row.created_at,
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects", post(register))
        .route("/projects", get(list))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterProject>,
) -> ApiResult<Json<ProjectView>> {
    let name = body.name.trim();
    let root = body.root_path.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("project name must not be empty".into()));
    }
    if !std::path::Path::new(root).is_absolute() {
        return Err(ApiError::BadRequest(format!(
            "root path must be absolute: {root}"
        )));
    }

    let row = projects::ProjectRow {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        root_path: root.to_string(),
        created_at: now_millis(),
    };
    projects::insert(&state.db, &row).await.map_err(|err| {
        if err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false)
        {
            ApiError::Conflict(format!("root path already registered: {root}"))
        } else {
            ApiError::Sqlx(err)
        }
    })?;
    tracing::info!(project = %row.name, root = %row.root_path, "project registered");
    Ok(Json(row.into()))
}

async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<ProjectView>>> {
    let rows = projects::list(&state.db).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
