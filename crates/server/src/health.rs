use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use warden_core::config::ExecutionMode;
use warden_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    mode: ExecutionMode,
}

impl HealthState {
    pub fn new(db_pool: DbPool, mode: ExecutionMode) -> Self {
        Self { db_pool, mode }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mode: ExecutionMode,
    pub pipeline: HealthCheck,
    pub audit_store: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// The pipeline keeps running when the audit store is down, so a failed
/// database check degrades the status rather than failing it.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let audit_store = database_check(&state.db_pool).await;
    let ready = audit_store.status == "ready";

    let pipeline = match state.mode {
        ExecutionMode::Off => HealthCheck { status: "idle", detail: "pipeline is off".to_string() },
        ExecutionMode::DryRun => {
            HealthCheck { status: "ready", detail: "dry run: commands are simulated".to_string() }
        }
        ExecutionMode::Live => {
            HealthCheck { status: "ready", detail: "live: commands are dispatched".to_string() }
        }
    };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        mode: state.mode,
        pipeline,
        audit_store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_entry").fetch_one(pool).await {
        Ok(rows) => HealthCheck { status: "ready", detail: format!("{rows} audit entries stored") },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("audit store query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use warden_core::config::ExecutionMode;
    use warden_db::{connect_with_settings, migrations};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_audit_store_is_reachable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let (status, Json(payload)) =
            health(State(HealthState::new(pool.clone(), ExecutionMode::DryRun))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.mode, ExecutionMode::DryRun);
        assert_eq!(payload.audit_store.detail, "0 audit entries stored");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_degrades_when_audit_store_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState::new(pool, ExecutionMode::Live))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.audit_store.status, "degraded");
        assert_eq!(payload.pipeline.status, "ready");
    }
}
