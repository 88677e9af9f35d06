use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::AppState;

/// Signaling WebSocket - one connection per peer or dashboard observer
pub async fn signaling_websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.hub.clone();
    let metrics = state.metrics.clone();
    let send_queue_capacity = state.server_config.send_queue_capacity;

    ws.on_upgrade(move |socket| {
        crate::ws::handle_signaling_ws(socket, hub, send_queue_capacity, metrics)
    })
}
