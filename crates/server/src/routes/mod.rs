// crates/server/src/routes/mod.rs
//! Route modules, one per surface, each exporting a `router()` merged
//! under `/api` by `create_app`.

pub mod agents;
pub mod health;
pub mod hooks;
pub mod projects;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::router())
        .merge(projects::router())
        .merge(agents::router())
        .merge(hooks::router())
}
