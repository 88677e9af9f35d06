use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns relay status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.snapshot();

    let status = if metrics.errors.websocket == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        peers: state.hub.peer_count().await,
        rooms: state.hub.room_count().await,
        observers: state.hub.observer_count().await,
        connections: metrics.connections.active,
        uptime_secs: metrics.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Current peer list and counts, the same payload dashboard observers receive
pub async fn dashboard_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.snapshot().await)
}
