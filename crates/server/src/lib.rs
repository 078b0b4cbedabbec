// crates/server/src/lib.rs
//! taskdeck server: correlates lifecycle hook signals from concurrent
//! coding-agent sessions into per-agent task state, reconciled against the
//! sessions' transcript logs.

pub mod correlate;
pub mod error;
pub mod lifecycle;
pub mod live;
pub mod reaper;
pub mod reconcile;
pub mod registry;
pub mod routes;
pub mod state;
pub mod transcript_cursor;
pub mod watcher;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router with middleware attached.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", routes::api_router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
