// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use taskdeck_core::ParseError;
use taskdeck_db::DbError;
use thiserror::Error;

/// Structured JSON error body returned by every failing route.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The event's working directory is not under any registered project
    /// root. Nothing is created; the sender sees a 404.
    #[error("no registered project for working directory: {0}")]
    UnregisteredProject(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transcript error: {0}")]
    Parse(#[from] ParseError),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::UnregisteredProject(cwd) => {
                tracing::warn!(cwd = %cwd, "event for unregistered project rejected");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details(
                        "Unregistered project",
                        format!("working directory: {cwd}"),
                    ),
                )
            }
            ApiError::AgentNotFound(id) => {
                tracing::warn!(agent_id = %id, "agent not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Agent not found", format!("agent id: {id}")),
                )
            }
            ApiError::TaskNotFound(id) => {
                tracing::warn!(task_id = %id, "task not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Task not found", format!("task id: {id}")),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Conflict(msg) => {
                tracing::warn!(message = %msg, "conflict");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("Conflict", msg.clone()),
                )
            }
            ApiError::Parse(parse_err) => {
                let (status, msg) = match parse_err {
                    ParseError::NotFound { path } => {
                        tracing::error!(path = %path.display(), "transcript not found");
                        (StatusCode::NOT_FOUND, "Transcript not found")
                    }
                    ParseError::PermissionDenied { path } => {
                        tracing::error!(path = %path.display(), "transcript permission denied");
                        (StatusCode::FORBIDDEN, "Permission denied")
                    }
                    ParseError::Io { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "transcript io error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "IO error reading transcript")
                    }
                };
                (status, ErrorResponse::with_details(msg, parse_err.to_string()))
            }
            ApiError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Database error", err.to_string()),
                )
            }
            ApiError::Sqlx(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Database error", err.to_string()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "internal server error");
                // Internal details stay out of the response body.
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
