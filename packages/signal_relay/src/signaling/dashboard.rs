//! Dashboard Feed
//!
//! Observers are a classification of their own, kept apart from peer and room
//! membership. They receive global state, recomputed from the registry on
//! every publish; nothing about the dashboard is cached.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::outbox::Outbox;
use super::peer::{Peer, PeerRegistry};
use crate::ws::{ConnectionHandle, ConnectionId, ServerMessage};

/// One row of the dashboard peer list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPeer {
    pub peer_id: String,
    pub is_source: bool,
    pub room_id: String,
    /// Registration time, Unix epoch milliseconds.
    pub timestamp: i64,
    pub connected: bool,
}

impl From<&Peer> for DashboardPeer {
    fn from(peer: &Peer) -> Self {
        Self {
            peer_id: peer.peer_id.clone(),
            is_source: peer.is_source,
            room_id: peer.room_id.clone(),
            timestamp: peer.registered_at.timestamp_millis(),
            connected: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_peers: usize,
    pub source_peers: usize,
    pub client_peers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub peers: Vec<DashboardPeer>,
    pub stats: DashboardStats,
}

impl DashboardSnapshot {
    /// Derive the snapshot from the registry's open peers.
    pub fn from_registry(registry: &PeerRegistry) -> Self {
        let peers: Vec<DashboardPeer> = registry.list().into_iter().map(DashboardPeer::from).collect();
        let source_peers = peers.iter().filter(|p| p.is_source).count();
        let stats = DashboardStats {
            total_peers: peers.len(),
            source_peers,
            client_peers: peers.len() - source_peers,
        };
        Self { peers, stats }
    }
}

#[derive(Default)]
pub struct DashboardFeed {
    observers: HashMap<ConnectionId, ConnectionHandle>,
}

impl DashboardFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a connection as an observer. Returns false if it already was one.
    pub fn subscribe(&mut self, handle: ConnectionHandle) -> bool {
        self.observers.insert(handle.id(), handle).is_none()
    }

    pub fn unsubscribe(&mut self, connection: ConnectionId) -> bool {
        self.observers.remove(&connection).is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Compute one snapshot and queue a `dashboard-update` for every open
    /// observer. Returns how many observers were targeted.
    pub fn publish(&self, registry: &PeerRegistry, outbox: &mut Outbox) -> usize {
        let targets: Vec<ConnectionHandle> = self
            .observers
            .values()
            .filter(|o| o.is_open())
            .cloned()
            .collect();
        if targets.is_empty() {
            return 0;
        }
        let message = ServerMessage::DashboardUpdate {
            snapshot: DashboardSnapshot::from_registry(registry),
        };
        let Some(frame) = message.to_frame() else {
            return 0;
        };
        let count = targets.len();
        outbox.push_many(targets, frame);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::test_helpers::Connections;

    #[test]
    fn snapshot_counts_open_peers_only() {
        let mut conns = Connections::default();
        let mut reg = PeerRegistry::new("default");
        let src = conns.open();
        let cli = conns.open();
        let gone = conns.open();
        reg.register(src.clone(), Some("src1".into()), Some("r1".into()), true);
        reg.register(cli.clone(), Some("cli1".into()), Some("r1".into()), false);
        reg.register(gone.clone(), Some("cli2".into()), None, false);
        gone.close();

        let snap = DashboardSnapshot::from_registry(&reg);
        assert_eq!(
            snap.stats,
            DashboardStats {
                total_peers: 2,
                source_peers: 1,
                client_peers: 1
            }
        );
        assert_eq!(snap.peers[0].peer_id, "src1");
        assert_eq!(snap.peers[1].peer_id, "cli1");
        assert!(snap.peers.iter().all(|p| p.connected));
    }

    #[test]
    fn snapshot_row_wire_format() {
        let mut conns = Connections::default();
        let mut reg = PeerRegistry::new("default");
        let h = conns.open();
        let registered_at = reg.register(h, Some("p".into()), None, false).registered_at;
        let snap = DashboardSnapshot::from_registry(&reg);
        let v = serde_json::to_value(&snap.peers[0]).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "peerId": "p",
                "isSource": false,
                "roomId": "default",
                "timestamp": registered_at.timestamp_millis(),
                "connected": true
            })
        );
    }

    #[test]
    fn publish_targets_open_observers_only() {
        let mut conns = Connections::default();
        let reg = PeerRegistry::new("default");
        let mut feed = DashboardFeed::new();
        let watcher = conns.open();
        let stale = conns.open();
        let bystander = conns.open();
        assert!(feed.subscribe(watcher.clone()));
        assert!(!feed.subscribe(watcher.clone()));
        feed.subscribe(stale.clone());
        stale.close();

        let mut outbox = Outbox::default();
        assert_eq!(feed.publish(&reg, &mut outbox), 1);
        outbox.deliver();

        let frames = conns.drain(&watcher);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["action"], "dashboard-update");
        assert_eq!(frames[0]["stats"]["totalPeers"], 0);
        assert!(conns.drain(&bystander).is_empty());
    }

    #[test]
    fn publish_without_observers_queues_nothing() {
        let reg = PeerRegistry::new("default");
        let feed = DashboardFeed::new();
        let mut outbox = Outbox::default();
        assert_eq!(feed.publish(&reg, &mut outbox), 0);
        assert!(outbox.is_empty());
    }

    #[test]
    fn unsubscribe_removes_observer() {
        let mut conns = Connections::default();
        let mut feed = DashboardFeed::new();
        let h = conns.open();
        feed.subscribe(h.clone());
        assert_eq!(feed.observer_count(), 1);
        assert!(feed.unsubscribe(h.id()));
        assert!(!feed.unsubscribe(h.id()));
        assert_eq!(feed.observer_count(), 0);
    }
}
