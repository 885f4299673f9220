//! HTTP front door of the daemon: inbound directives, status and engagement reports.

use super::engagement::EngagementRecorder;
use axum::{
    extract::State,
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use outreach_core::{ActivityKind, AgentCompletion, ContextHandle, Credentials, Error, SettingsOverride};
use outreach_scheduler::WorkerHandle;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct GatewayState {
    pub worker: WorkerHandle,
    pub recorder: EngagementRecorder,
    pub api_token: Option<String>,
    pub started_at: Instant,
}

fn secure_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (&x, &y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn bearer_matches(auth_header: Option<&str>, token: &str) -> bool {
    match auth_header {
        Some(h) if h.starts_with("Bearer ") => secure_eq(h[7..].trim(), token),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Bearer token authentication middleware
// ---------------------------------------------------------------------------

async fn auth_middleware(
    State(state): State<GatewayState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match &state.api_token {
        Some(t) if !t.is_empty() => t,
        _ => return next.run(req).await,
    };

    if req.uri().path() == "/v1/health" {
        return next.run(req).await;
    }

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if bearer_matches(auth_header, token) {
        next.run(req).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized: invalid or missing Bearer token").into_response()
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    list_id: String,
    token: String,
    workspace_id: String,
    #[serde(default)]
    settings: Option<SettingsOverride>,
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Deserialize, Default)]
struct StopRequest {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletedRequest {
    #[serde(default = "default_completion_reason")]
    reason: String,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    activity_id: Option<String>,
}

impl CompletedRequest {
    fn into_completion(self) -> AgentCompletion {
        let mut completion = AgentCompletion::new(&self.reason);
        if let Some(handle) = self.handle {
            completion = completion.on(ContextHandle::new(handle));
        }
        if let Some(activity_id) = self.activity_id {
            completion = completion.for_activity(activity_id);
        }
        completion
    }
}

fn default_completion_reason() -> String {
    "completed".to_string()
}

#[derive(Deserialize)]
struct ContextClosedRequest {
    handle: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityReport {
    kind: ActivityKind,
    #[serde(default)]
    candidate_id: Option<String>,
    #[serde(default)]
    activity_id: Option<String>,
}

fn error_status(e: &Error) -> StatusCode {
    match e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::AlreadyRunning(_) => StatusCode::CONFLICT,
        Error::Ledger(_) => StatusCode::BAD_GATEWAY,
        Error::WorkerGone(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: Error) -> Response {
    let status = error_status(&e);
    if status.is_server_error() {
        warn!(error = %e, "Gateway request failed");
    }
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_start(State(state): State<GatewayState>, Json(req): Json<StartRequest>) -> Response {
    let credentials = Credentials::new(&req.token, &req.workspace_id);
    match state
        .worker
        .start(&req.list_id, credentials, req.settings, req.prompt)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_stop(State(state): State<GatewayState>, body: Option<Json<StopRequest>>) -> Response {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let reason = req.reason.unwrap_or_else(|| "stop requested".to_string());
    match state.worker.stop(&reason).await {
        Ok(()) => Json(json!({ "status": "stopped" })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_status(State(state): State<GatewayState>) -> Response {
    match state.worker.status().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_agent_completed(
    State(state): State<GatewayState>,
    Json(req): Json<CompletedRequest>,
) -> Response {
    match state.worker.agent_completed(req.into_completion()).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_context_closed(
    State(state): State<GatewayState>,
    Json(req): Json<ContextClosedRequest>,
) -> Response {
    match state.worker.context_closed(ContextHandle::new(req.handle)).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_activity(
    State(state): State<GatewayState>,
    Json(req): Json<ActivityReport>,
) -> Response {
    match state
        .recorder
        .record(req.kind, req.candidate_id.as_deref(), req.activity_id.as_deref())
        .await
    {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_health(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/v1/start", post(handle_start))
        .route("/v1/stop", post(handle_stop))
        .route("/v1/status", get(handle_status))
        .route("/v1/agent/completed", post(handle_agent_completed))
        .route("/v1/context/closed", post(handle_context_closed))
        .route("/v1/activity", post(handle_activity))
        .route("/v1/health", get(handle_health))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(CorsLayer::permissive().allow_credentials(false))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
