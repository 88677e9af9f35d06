//! Connection Handle
//!
//! The transport-owned side of a signaling connection. The signaling core holds
//! clones of [`ConnectionHandle`] as membership references; it never touches the
//! socket directly. Frames pushed through [`ConnectionHandle::send`] land on a
//! bounded queue drained by the connection's sender task.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A pre-serialized outbound JSON text frame, shared across recipients.
pub type Frame = Arc<str>;

/// Unique identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("connection is closed")]
    Closed,
}

/// Cloneable reference to a live connection: identity, readiness, send, close.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle plus the receiving end of its outbound queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: ConnectionId::new(),
            tx,
            closed: CancellationToken::new(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// True until the connection is closed locally or its sender task is gone.
    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled() && !self.tx.is_closed()
    }

    /// Queue a frame without waiting. Never blocks on the socket.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Ask the transport to close this connection. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Token cancelled once [`close`](Self::close) has been called.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}
