use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Liveness report for load balancers and operators.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the record store cannot be reached.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    /// Open WebSocket connections on this process.
    pub live_connections: usize,
    /// Distinct jobs those connections watch.
    pub watched_jobs: usize,
}

/// GET /health. Unauthenticated.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = state.jobs.store_healthy().await;
    if !db_healthy {
        tracing::warn!("Health check: job store unreachable");
    }

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        live_connections: state.registry.connection_count(),
        watched_jobs: state.registry.job_count(),
    })
}

/// Mounted at the root, outside `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
