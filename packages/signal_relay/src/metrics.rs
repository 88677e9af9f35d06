//! Server metrics for observability
//!
//! Provides runtime counters for monitoring relay health and throughput.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently active WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,

    // Peer metrics
    /// Successful `register` actions (re-registrations included)
    pub peers_registered: AtomicU64,
    /// Registered peers whose connection closed
    pub peers_departed: AtomicU64,
    /// Peers evicted by `remove-peer`
    pub peers_removed: AtomicU64,
    /// Registrations refused by the duplicate id policy
    pub registrations_rejected: AtomicU64,

    // Message metrics
    /// Text frames received from clients
    pub messages_received: AtomicU64,
    /// Frames queued to clients
    pub frames_sent: AtomicU64,
    /// Frames dropped because the recipient's queue was full or closed
    pub frames_dropped: AtomicU64,
    /// Dashboard snapshots pushed to observers
    pub dashboard_publishes: AtomicU64,

    // Error metrics
    /// Inbound frames discarded as malformed
    pub malformed_messages: AtomicU64,
    /// WebSocket errors
    pub websocket_errors: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    // Peer tracking
    pub fn peer_registered(&self) {
        self.peers_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_departed(&self) {
        self.peers_departed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peers_evicted(&self, count: u64) {
        self.peers_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn registration_rejected(&self) {
        self.registrations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Message tracking
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_delivered(&self, sent: u64, dropped: u64) {
        self.frames_sent.fetch_add(sent, Ordering::Relaxed);
        self.frames_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn dashboard_published(&self) {
        self.dashboard_publishes.fetch_add(1, Ordering::Relaxed);
    }

    // Error tracking
    pub fn malformed_message(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn websocket_error(&self) {
        self.websocket_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            peers: PeerMetrics {
                registered: self.peers_registered.load(Ordering::Relaxed),
                departed: self.peers_departed.load(Ordering::Relaxed),
                removed: self.peers_removed.load(Ordering::Relaxed),
                rejected: self.registrations_rejected.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                sent: self.frames_sent.load(Ordering::Relaxed),
                dropped: self.frames_dropped.load(Ordering::Relaxed),
                dashboard_publishes: self.dashboard_publishes.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                malformed: self.malformed_messages.load(Ordering::Relaxed),
                websocket: self.websocket_errors.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub peers: PeerMetrics,
    pub messages: MessageMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerMetrics {
    pub registered: u64,
    pub departed: u64,
    pub removed: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    pub dashboard_publishes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub malformed: u64,
    pub websocket: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub peers: usize,
    pub rooms: usize,
    pub observers: usize,
    pub connections: u64,
    pub uptime_secs: u64,
}
