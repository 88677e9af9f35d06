//! Signaling Core
//!
//! Peer registry, room membership, the action state machine and the dashboard
//! feed. Nothing in here knows about sockets; connections are reached only
//! through [`crate::ws::ConnectionHandle`].

mod dashboard;
mod outbox;
mod peer;
mod relay;
mod room;

#[cfg(test)]
mod test_helpers;

pub use dashboard::DashboardSnapshot;
pub use relay::SignalingHub;
