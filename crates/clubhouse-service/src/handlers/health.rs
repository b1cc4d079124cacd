//! Health check handlers.
//!
//! - `/health`: Liveness - reports database reachability but always returns 200
//! - `/ready`: Readiness - 503 while the database is unreachable

use crate::models::{HealthResponse, ReadinessResponse};
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Liveness handler.
///
/// ## Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "instance_id": "clubhouse-web-1-3f2a9c1d",
///   "database": "healthy"
/// }
/// ```
#[instrument(skip_all, name = "clubhouse.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();
    let status = if db_healthy { "healthy" } else { "unhealthy" };

    // Unhealthy is still a 200 so the orchestrator can read the body.
    Json(HealthResponse {
        status: status.to_string(),
        instance_id: state.config.instance_id.clone(),
        database: Some(status.to_string()),
    })
}

/// Readiness handler.
///
/// Error messages are generic; the underlying error is logged.
#[instrument(skip_all, name = "clubhouse.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        tracing::warn!(target: "clubhouse.health", error = %e, "Readiness check failed: database error");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                database: Some("unhealthy"),
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            database: Some("healthy"),
            error: None,
        }),
    )
}
