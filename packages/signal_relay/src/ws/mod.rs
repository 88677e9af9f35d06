//! Signaling WebSocket Transport
//!
//! Adapts accepted WebSocket connections to the signaling core:
//! - [`ConnectionHandle`] is what the core holds for each connection
//! - the JSON wire messages are [`ClientMessage`] and [`ServerMessage`]
//! - [`handle_signaling_ws`] runs one connection from upgrade to close

mod connection;
mod handler;
mod protocol;

#[cfg(test)]
mod e2e_tests;

pub use connection::{ConnectionHandle, ConnectionId, Frame, SendError};
pub use handler::handle_signaling_ws;
pub use protocol::{ClientMessage, FoundPeer, RelayKind, ServerMessage, relay_frame};
