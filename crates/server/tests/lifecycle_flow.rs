// crates/server/tests/lifecycle_flow.rs
//! End-to-end lifecycle scenarios over the HTTP surface with an in-memory
//! database: hook sequences in, task state and turn history out.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pretty_assertions::{assert_eq, assert_ne};
use serde_json::{json, Value};
use taskdeck_db::{agents, events, now_millis, projects, Database};
use taskdeck_server::state::AppState;
use taskdeck_server::create_app;
use tower::ServiceExt;

const PROJECT_ROOT: &str = "/work/app";

async fn test_app() -> (Router, Arc<AppState>) {
    let db = Database::new_in_memory().await.unwrap();
    projects::insert(
        &db,
        &projects::ProjectRow {
            id: "p1".into(),
            name: "app".into(),
            root_path: PROJECT_ROOT.into(),
            created_at: now_millis(),
        },
    )
    .await
    .unwrap();
    let state = AppState::new(db, None);
    (create_app(state.clone()), state)
}

async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn hook(session: &str) -> Value {
    json!({ "session_id": session, "cwd": format!("{PROJECT_ROOT}/src") })
}

fn hook_with(session: &str, extra: &[(&str, &str)]) -> Value {
    let mut body = hook(session);
    for (key, value) in extra {
        body[*key] = json!(value);
    }
    body
}

#[tokio::test]
async fn scenario_happy_path_command_to_complete() {
    let (app, _state) = test_app().await;

    let (status, started) = post(&app, "/api/hooks/session-start", hook("s1")).await;
    assert_eq!(status, StatusCode::OK);
    let agent_id = started["agentId"].as_str().unwrap().to_string();

    let (status, commanded) = post(
        &app,
        "/api/hooks/user-input",
        hook_with("s1", &[("prompt", "implement the exporter")]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(commanded["state"], "commanded");
    assert_eq!(commanded["intent"], "command");

    let (_, processing) = post(&app, "/api/hooks/pre-tool", hook("s1")).await;
    assert_eq!(processing["state"], "processing");

    let (_, complete) = post(
        &app,
        "/api/hooks/stop",
        hook_with("s1", &[("text", "Done, the exporter is implemented.")]),
    )
    .await;
    assert_eq!(complete["state"], "complete");

    let (status, tasks) = get(&app, &format!("/api/agents/{agent_id}/tasks")).await;
    assert_eq!(status, StatusCode::OK);
    let tasks = tasks.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["state"], "complete");
    assert_eq!(tasks[0]["instruction"], "implement the exporter");
    assert!(tasks[0]["completedAt"].is_i64());
}

#[tokio::test]
async fn scenario_question_blocks_until_answered() {
    let (app, _state) = test_app().await;

    post(&app, "/api/hooks/session-start", hook("s1")).await;
    post(
        &app,
        "/api/hooks/user-input",
        hook_with("s1", &[("prompt", "migrate the settings format")]),
    )
    .await;

    let (_, blocked) = post(
        &app,
        "/api/hooks/stop",
        hook_with("s1", &[("text", "Should I keep the legacy keys or drop them?")]),
    )
    .await;
    assert_eq!(blocked["state"], "awaiting_input");
    assert_eq!(blocked["intent"], "question");

    let (_, resumed) = post(
        &app,
        "/api/hooks/user-input",
        hook_with("s1", &[("prompt", "drop them")]),
    )
    .await;
    assert_eq!(resumed["state"], "processing");
    assert_eq!(resumed["intent"], "answer");

    let (_, done) = post(
        &app,
        "/api/hooks/stop",
        hook_with("s1", &[("text", "Done, migrated and the legacy keys are gone.")]),
    )
    .await;
    assert_eq!(done["state"], "complete");
}

#[tokio::test]
async fn scenario_permission_request_routes_as_question() {
    let (app, _state) = test_app().await;

    post(&app, "/api/hooks/session-start", hook("s1")).await;
    post(
        &app,
        "/api/hooks/user-input",
        hook_with("s1", &[("prompt", "clean up the scripts dir")]),
    )
    .await;

    let (_, blocked) = post(
        &app,
        "/api/hooks/permission-request",
        hook_with("s1", &[("message", "Permission needed to run rm -rf scripts/old")]),
    )
    .await;
    assert_eq!(blocked["state"], "awaiting_input");
    assert_eq!(blocked["intent"], "question");
}

#[tokio::test]
async fn scenario_duplicate_delivery_is_idempotent() {
    let (app, _state) = test_app().await;

    post(&app, "/api/hooks/session-start", hook("s1")).await;
    let body = hook_with("s1", &[("prompt", "implement X")]);

    let (_, first) = post(&app, "/api/hooks/user-input", body.clone()).await;
    assert!(first["duplicate"].is_null());
    let task_id = first["taskId"].as_str().unwrap().to_string();

    let (status, second) = post(&app, "/api/hooks/user-input", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["duplicate"], true);

    let (_, turns) = get(&app, &format!("/api/tasks/{task_id}/turns")).await;
    assert_eq!(turns.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn scenario_unregistered_project_rejected_without_rows() {
    let (app, state) = test_app().await;

    let (status, body) = post(
        &app,
        "/api/hooks/user-input",
        json!({
            "session_id": "s1",
            "cwd": "/somewhere/else",
            "prompt": "implement X"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Unregistered project");

    assert!(agents::list_live(&state.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn scenario_inferred_task_from_tool_activity() {
    let (app, state) = test_app().await;

    post(&app, "/api/hooks/session-start", hook("s1")).await;
    // No user-input ever arrives; the first signal is tool activity.
    let (status, inferred) = post(&app, "/api/hooks/pre-tool", hook("s1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inferred["state"], "processing");
    let agent_id = inferred["agentId"].as_str().unwrap().to_string();

    let (_, agents_view) = get(&app, "/api/agents").await;
    let current = &agents_view.as_array().unwrap()[0]["currentTask"];
    assert_eq!(current["state"], "processing");
    assert!(current["instruction"].is_null());

    let kinds: Vec<String> = events::list_for_agent(&state.db, &agent_id, 20)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&"missing_user_turn".to_string()));
}

#[tokio::test]
async fn scenario_complete_task_never_reopened() {
    let (app, _state) = test_app().await;

    post(&app, "/api/hooks/session-start", hook("s1")).await;
    let (_, commanded) = post(
        &app,
        "/api/hooks/user-input",
        hook_with("s1", &[("prompt", "implement X")]),
    )
    .await;
    let first_task = commanded["taskId"].as_str().unwrap().to_string();

    post(
        &app,
        "/api/hooks/stop",
        hook_with("s1", &[("text", "Done, implemented X.")]),
    )
    .await;

    // A straggling agent turn after completion lands on the finished task
    // without resurrecting it or opening a phantom one.
    let (_, late) = post(
        &app,
        "/api/hooks/stop",
        hook_with("s1", &[("text", "Also ran the formatter over the tree")]),
    )
    .await;
    assert_eq!(late["taskId"].as_str().unwrap(), first_task);
    assert_eq!(late["state"], "complete");

    let (_, turns) = get(&app, &format!("/api/tasks/{first_task}/turns")).await;
    assert_eq!(turns.as_array().unwrap().len(), 3);

    // The next user command is not swallowed by a leftover open task; it
    // starts a fresh one.
    let (_, next) = post(
        &app,
        "/api/hooks/user-input",
        hook_with("s1", &[("prompt", "implement Y")]),
    )
    .await;
    assert_ne!(next["taskId"].as_str().unwrap(), first_task);
    assert_eq!(next["intent"], "command");
    assert_eq!(next["state"], "commanded");
}

#[tokio::test]
async fn notification_without_text_still_touches_agent() {
    let (app, state) = test_app().await;

    let (_, started) = post(&app, "/api/hooks/session-start", hook("s1")).await;
    let agent_id = started["agentId"].as_str().unwrap().to_string();

    // Some notification payloads carry no message text; they still count
    // as agent activity rather than being rejected.
    let (status, body) = post(&app, "/api/hooks/notification", hook("s1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["agentId"].as_str().unwrap(), agent_id);
    assert_eq!(body["ignored"], true);

    // No question turn was fabricated from the empty payload.
    let tasks = taskdeck_db::tasks::list_for_agent(&state.db, &agent_id)
        .await
        .unwrap();
    assert!(tasks.is_empty());
    let agent = agents::get(&state.db, &agent_id).await.unwrap().unwrap();
    assert!(agent.last_seen_at >= agent.created_at);
}

#[tokio::test]
async fn scenario_session_end_is_idempotent() {
    let (app, state) = test_app().await;

    post(&app, "/api/hooks/session-start", hook("s1")).await;
    let (_, ended) = post(&app, "/api/hooks/session-end", hook("s1")).await;
    assert_eq!(ended["ok"], true);
    let agent_id = ended["agentId"].as_str().unwrap().to_string();
    assert!(agents::get(&state.db, &agent_id)
        .await
        .unwrap()
        .unwrap()
        .ended_at
        .is_some());

    // Ending again (or ending an unknown session) is acknowledged, not an
    // error.
    let (status, again) = post(&app, "/api/hooks/session-end", hook("s1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["ignored"], true);
}

#[tokio::test]
async fn missing_prompt_is_a_bad_request() {
    let (app, _state) = test_app().await;
    post(&app, "/api/hooks/session-start", hook("s1")).await;

    let (status, body) = post(&app, "/api/hooks/user-input", hook("s1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad request");
}

#[tokio::test]
async fn project_registration_and_conflict() {
    let db = Database::new_in_memory().await.unwrap();
    let state = AppState::new(db, None);
    let app = create_app(state);

    let body = json!({ "name": "app", "rootPath": "/work/app" });
    let (status, created) = post(&app, "/api/projects", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["rootPath"], "/work/app");

    let (status, _) = post(&app, "/api/projects", body).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, relative) = post(
        &app,
        "/api/projects",
        json!({ "name": "x", "rootPath": "relative/path" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(relative["error"], "Bad request");

    let (_, listed) = get(&app, "/api/projects").await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn health_reports_version() {
    let (app, _state) = test_app().await;
    let (status, body) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
