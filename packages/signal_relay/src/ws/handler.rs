//! Per-connection WebSocket loop
//!
//! One sender task drains the connection's outbound queue into the socket;
//! one input loop feeds inbound text frames to the hub in arrival order.
//! Whichever ends first tears the connection down, and the hub hears about
//! the departure exactly once.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::connection::ConnectionHandle;
use crate::metrics::ServerMetrics;
use crate::signaling::SignalingHub;

pub async fn handle_signaling_ws(
    socket: WebSocket,
    hub: Arc<SignalingHub>,
    send_queue_capacity: usize,
    metrics: Arc<ServerMetrics>,
) {
    let (handle, mut rx) = ConnectionHandle::new(send_queue_capacity);
    let conn_id = handle.id();
    info!(conn_id = %conn_id, "Client connected");
    metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let close_token = handle.close_token();

    // Task to send queued frames to the WebSocket
    let sender_task = async move {
        loop {
            tokio::select! {
                _ = close_token.cancelled() => {
                    debug!(conn_id = %conn_id, "Closing connection on request");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    };

    // Task to handle incoming messages
    let input_handle = handle.clone();
    let input_hub = hub.clone();
    let input_metrics = metrics.clone();
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    input_hub.handle_text(&input_handle, text.as_str()).await;
                }
                Ok(Message::Close(_)) => {
                    debug!(conn_id = %conn_id, "Client closed connection");
                    break;
                }
                Err(e) => {
                    warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                    input_metrics.websocket_error();
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!(conn_id = %conn_id, "Sender task ended"),
        _ = input_task => debug!(conn_id = %conn_id, "Input task ended"),
    }

    handle.close();
    hub.disconnect(&handle).await;
    metrics.connection_closed();
    info!(conn_id = %conn_id, "Client disconnected");
}
