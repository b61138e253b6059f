use axum::{extract::State, Json};
use crate::{models::HealthResponse, AppState};
use tracing::debug;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        rooms: state.registry.len().await,
    })
}

/// Liveness check for the orchestrator. Kept out of request tracing.
pub async fn live() -> &'static str {
    "OK"
}
