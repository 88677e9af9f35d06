//! Deferred delivery.
//!
//! State mutations run under the hub lock and only *collect* frames here; the
//! frames are pushed to connection queues after the lock is released.

use tracing::debug;

use crate::ws::{ConnectionHandle, Frame, SendError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: u64,
    pub dropped: u64,
}

#[derive(Default)]
pub struct Outbox {
    deliveries: Vec<(ConnectionHandle, Frame)>,
}

impl Outbox {
    pub fn push(&mut self, to: &ConnectionHandle, frame: Frame) {
        self.deliveries.push((to.clone(), frame));
    }

    pub fn push_many(&mut self, to: impl IntoIterator<Item = ConnectionHandle>, frame: Frame) {
        self.deliveries
            .extend(to.into_iter().map(|handle| (handle, frame.clone())));
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// Fire-and-forget every queued frame. Each send is independent; a full or
    /// closed recipient only loses its own copy.
    pub fn deliver(self) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for (handle, frame) in self.deliveries {
            match handle.send(frame) {
                Ok(()) => report.sent += 1,
                Err(SendError::QueueFull) => {
                    debug!(conn_id = %handle.id(), "Outbound queue full, dropping frame");
                    report.dropped += 1;
                }
                Err(SendError::Closed) => {
                    debug!(conn_id = %handle.id(), "Connection closed, dropping frame");
                    report.dropped += 1;
                }
            }
        }
        report
    }
}
