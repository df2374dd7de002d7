//! HTTP surface over the pipeline runtime.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_agent::{AgentRuntime, ConsoleOutcome, IntentReport, LiveWorld, PipelineReport};
use warden_core::audit::{AuditEntry, AuditSink};
use warden_core::config::{AppConfig, LoadOptions};
use warden_core::domain::actor::{ActorId, Role};
use warden_core::errors::{ApplicationError, InterfaceError};
use warden_core::execution::HistoryEntry;
use warden_core::validation::ValidationVerdict;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<AgentRuntime>,
    world: Arc<LiveWorld>,
    audit: Arc<dyn AuditSink>,
    load_options: Arc<LoadOptions>,
}

impl ApiState {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        world: Arc<LiveWorld>,
        audit: Arc<dyn AuditSink>,
        load_options: LoadOptions,
    ) -> Self {
        Self { runtime, world, audit, load_options: Arc::new(load_options) }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/chat", post(chat))
        .route("/v1/console", post(console))
        .route("/v1/audit", get(audit))
        .route("/v1/history/{actor}", get(history))
        .route("/v1/policy/reload", post(reload_policy))
        .route("/v1/locate/complete", post(complete_locate))
        .route("/v1/simulate", post(simulate))
        .with_state(state)
}

/// JSON error body. `detail` carries the internal message for operators.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

pub struct ApiError(InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = match &self.0 {
            InterfaceError::BadRequest { message, .. }
            | InterfaceError::NotFound { message, .. }
            | InterfaceError::ServiceUnavailable { message, .. }
            | InterfaceError::Internal { message, .. } => message.clone(),
        };
        let body = ErrorBody {
            error: self.0.code(),
            message: self.0.user_message(),
            detail,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(InterfaceError::BadRequest { message: message.into(), correlation_id: correlation_id() })
}

fn actor_from(raw: &str) -> Result<ActorId, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(bad_request("actor must not be empty"));
    }
    Ok(ActorId::new(trimmed))
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub actor: String,
    pub message: String,
}

async fn chat(
    State(state): State<ApiState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<PipelineReport>, ApiError> {
    let actor = actor_from(&body.actor)?;
    Ok(Json(state.runtime.handle_chat(&actor, &body.message).await))
}

#[derive(Debug, Deserialize)]
pub struct ConsoleRequest {
    pub line: String,
}

async fn console(
    State(state): State<ApiState>,
    Json(body): Json<ConsoleRequest>,
) -> Json<ConsoleOutcome> {
    Json(state.runtime.handle_console(&body.line, &state.world).await)
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub limit: Option<usize>,
}

async fn audit(
    State(state): State<ApiState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let limit = clamp_limit(query.limit);
    let result = match query.actor.as_deref() {
        Some(actor) => state.audit.recent_for_actor(&actor_from(actor)?, limit).await,
        None => state.audit.recent(limit).await,
    };
    result.map(Json).map_err(|error| {
        ApiError(ApplicationError::Persistence(error.to_string()).into_interface(correlation_id()))
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

async fn history(
    State(state): State<ApiState>,
    Path(actor): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let actor = actor_from(&actor)?;
    Ok(Json(state.runtime.coordinator().history(&actor, clamp_limit(query.limit))))
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: &'static str,
    pub rosters: Vec<RosterSize>,
}

#[derive(Debug, Serialize)]
pub struct RosterSize {
    pub role: Role,
    pub members: usize,
}

async fn reload_policy(State(state): State<ApiState>) -> Result<Json<ReloadResponse>, ApiError> {
    let correlation = correlation_id();
    let config = AppConfig::load((*state.load_options).clone()).map_err(|error| {
        tracing::warn!(
            event_name = "system.policy.reload_failed",
            correlation_id = %correlation,
            error = %error,
            "policy reload rejected"
        );
        ApiError(ApplicationError::Configuration(error.to_string()).into_interface(&correlation))
    })?;

    let policy = config.permission_policy();
    let rosters = Role::ALL
        .into_iter()
        .filter(|role| !role.is_lowest())
        .map(|role| RosterSize { role, members: policy.roster_size(role) })
        .collect();
    state.runtime.permissions().reload(policy);
    tracing::info!(
        event_name = "system.policy.reloaded",
        correlation_id = %correlation,
        "permission policy replaced"
    );
    Ok(Json(ReloadResponse { status: "reloaded", rosters }))
}

#[derive(Debug, Deserialize)]
pub struct LocateCompletion {
    pub actor: String,
    pub output: String,
}

async fn complete_locate(
    State(state): State<ApiState>,
    Json(body): Json<LocateCompletion>,
) -> Result<Json<IntentReport>, ApiError> {
    let actor = actor_from(&body.actor)?;
    state.runtime.complete_locate(&actor, &body.output).await.map(Json).ok_or_else(|| {
        ApiError(InterfaceError::NotFound {
            message: format!("no locate pending for `{actor}`"),
            correlation_id: correlation_id(),
        })
    })
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub command: String,
    #[serde(default)]
    pub actor: Option<String>,
}

async fn simulate(
    State(state): State<ApiState>,
    Json(body): Json<SimulateRequest>,
) -> Result<Json<ValidationVerdict>, ApiError> {
    let actor = match body.actor.as_deref() {
        Some(actor) => actor_from(actor)?,
        None => ActorId::new("console"),
    };
    Ok(Json(state.runtime.simulator().simulate(&body.command, &actor)))
}
