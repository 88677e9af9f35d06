//! Signaling Hub
//!
//! Interprets inbound actions, mutates the peer registry and rooms, and decides
//! who hears about it. All three pieces of shared state sit behind one lock;
//! every handler collects its frames into an [`Outbox`] while holding it and
//! delivers them only after the guard is dropped, so a slow peer can never
//! stall registry updates for anyone else.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::dashboard::{DashboardFeed, DashboardSnapshot};
use super::outbox::Outbox;
use super::peer::PeerRegistry;
use super::room::{Leave, RoomManager};
use crate::config::{DuplicatePeerIdPolicy, SignalingConfig};
use crate::metrics::ServerMetrics;
use crate::ws::{
    ClientMessage, ConnectionHandle, ConnectionId, FoundPeer, RelayKind, ServerMessage,
    relay_frame,
};

struct HubState {
    peers: PeerRegistry,
    rooms: RoomManager,
    dashboard: DashboardFeed,
}

impl HubState {
    /// Take `connection` out of `room_id` and tell whoever is left that
    /// `peer_id` is gone. An emptied room disappears silently.
    fn leave_room(
        &mut self,
        room_id: &str,
        connection: ConnectionId,
        peer_id: &str,
        outbox: &mut Outbox,
    ) {
        match self.rooms.leave(room_id, connection) {
            Leave::Remaining(remaining) => {
                debug!(room = %room_id, remaining, "Peer left room");
                let message = ServerMessage::PeerLeft {
                    peer_id: peer_id.to_string(),
                };
                if let Some(frame) = message.to_frame() {
                    self.rooms.broadcast(room_id, frame, Some(connection), outbox);
                }
            }
            Leave::RoomDeleted => debug!(room = %room_id, "Room emptied and deleted"),
            Leave::NotMember => {}
        }
    }

    fn publish_dashboard(&self, outbox: &mut Outbox, metrics: &ServerMetrics) {
        if self.dashboard.publish(&self.peers, outbox) > 0 {
            metrics.dashboard_published();
        }
    }
}

/// Shared signaling state plus the action handlers that drive it.
pub struct SignalingHub {
    state: RwLock<HubState>,
    config: SignalingConfig,
    metrics: Arc<ServerMetrics>,
}

impl SignalingHub {
    pub fn new(config: SignalingConfig, metrics: Arc<ServerMetrics>) -> Self {
        let state = HubState {
            peers: PeerRegistry::new(config.default_room.clone()),
            rooms: RoomManager::new(),
            dashboard: DashboardFeed::new(),
        };
        Self {
            state: RwLock::new(state),
            config,
            metrics,
        }
    }

    /// Entry point for one inbound text frame. Malformed frames are counted,
    /// logged and dropped; the connection stays up.
    pub async fn handle_text(&self, conn: &ConnectionHandle, text: &str) {
        self.metrics.message_received();
        match ClientMessage::parse(text) {
            Ok(msg) => self.handle_message(conn, msg).await,
            Err(e) => {
                self.metrics.malformed_message();
                debug!(conn_id = %conn.id(), "Discarding frame: {}", e);
            }
        }
    }

    pub async fn handle_message(&self, conn: &ConnectionHandle, msg: ClientMessage) {
        debug!(conn_id = %conn.id(), action = msg.action(), "Handling message");
        let outbox = match msg {
            ClientMessage::Register {
                peer_id,
                room_id,
                is_source,
            } => self.register(conn, peer_id, room_id, is_source).await,
            ClientMessage::GetPeer { room_id } => self.get_peer(conn, room_id).await,
            ClientMessage::UpdatePeer {
                offer,
                answer,
                ice_candidate,
            } => self.update_peer(conn, offer, answer, ice_candidate).await,
            ClientMessage::Relay { kind, payload } => self.relay(conn, kind, payload).await,
            ClientMessage::GetPeerUpdates { peer_id } => {
                self.get_peer_updates(conn, &peer_id).await
            }
            ClientMessage::DashboardConnect => self.dashboard_connect(conn).await,
            ClientMessage::RemovePeer { peer_id } => self.remove_peer(conn, &peer_id).await,
        };
        self.flush(outbox);
    }

    /// Connection closed: drop its peer, leave its room, notify the room and
    /// observers. Safe to call for connections that never registered.
    pub async fn disconnect(&self, conn: &ConnectionHandle) {
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.write().await;
            if let Some(peer) = state.peers.remove(conn.id()) {
                info!(peer_id = %peer.peer_id, room = %peer.room_id, "Peer disconnected");
                state.leave_room(&peer.room_id, conn.id(), &peer.peer_id, &mut outbox);
                self.metrics.peer_departed();
            }
            state.dashboard.unsubscribe(conn.id());
            state.publish_dashboard(&mut outbox, &self.metrics);
        }
        self.flush(outbox);
    }

    async fn register(
        &self,
        conn: &ConnectionHandle,
        peer_id: Option<String>,
        room_id: Option<String>,
        is_source: bool,
    ) -> Outbox {
        let mut outbox = Outbox::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let rejected = match (self.config.duplicate_peer_ids, peer_id.as_deref()) {
            (DuplicatePeerIdPolicy::Reject, Some(requested)) => {
                state.peers.is_peer_id_taken(requested, conn.id())
            }
            _ => false,
        };
        if rejected {
            let requested = peer_id.unwrap_or_default();
            info!(peer_id = %requested, "Registration rejected: peerId in use");
            self.metrics.registration_rejected();
            let message = ServerMessage::RegisterRejected {
                peer_id: requested,
                reason: "peerId already in use".to_string(),
            };
            if let Some(frame) = message.to_frame() {
                outbox.push(conn, frame);
            }
            return outbox;
        }

        let room_id = room_id
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| state.peers.default_room().to_string());

        // Re-registration into another room moves the connection.
        let moved_from = state
            .peers
            .get(conn.id())
            .filter(|previous| previous.room_id != room_id)
            .map(|previous| (previous.room_id.clone(), previous.peer_id.clone()));
        if let Some((old_room, old_peer_id)) = moved_from {
            state.leave_room(&old_room, conn.id(), &old_peer_id, &mut outbox);
        }

        let peer = state
            .peers
            .register(conn.clone(), peer_id, Some(room_id), is_source);
        let reply = ServerMessage::Registered {
            peer_id: peer.peer_id.clone(),
            room_id: peer.room_id.clone(),
            is_source: peer.is_source,
        };
        let role = if peer.is_source { "source" } else { "client" };
        info!(peer_id = %peer.peer_id, room = %peer.room_id, role, "Peer registered");
        let joined_room = peer.room_id.clone();
        state.rooms.join(&joined_room, conn.clone());
        self.metrics.peer_registered();

        if let Some(frame) = reply.to_frame() {
            outbox.push(conn, frame);
        }
        state.publish_dashboard(&mut outbox, &self.metrics);
        outbox
    }

    async fn get_peer(&self, conn: &ConnectionHandle, room_id: Option<String>) -> Outbox {
        let mut outbox = Outbox::default();
        let state = self.state.read().await;

        let room_id = room_id
            .filter(|r| !r.is_empty())
            .or_else(|| state.peers.get(conn.id()).map(|p| p.room_id.clone()))
            .unwrap_or_else(|| state.peers.default_room().to_string());

        let source = state
            .rooms
            .members(&room_id)
            .iter()
            .filter(|m| m.id() != conn.id() && m.is_open())
            .filter_map(|m| state.peers.get(m.id()))
            .find(|p| p.is_source);

        let reply = match source {
            Some(peer) => ServerMessage::PeerFound {
                peer: FoundPeer {
                    peer_id: peer.peer_id.clone(),
                    offer: peer.offer.clone(),
                    is_source: true,
                },
            },
            None => ServerMessage::PeerNotFound,
        };
        if let Some(frame) = reply.to_frame() {
            outbox.push(conn, frame);
        }
        outbox
    }

    async fn update_peer(
        &self,
        conn: &ConnectionHandle,
        offer: Option<Value>,
        answer: Option<Value>,
        ice_candidate: Option<Value>,
    ) -> Outbox {
        let mut outbox = Outbox::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if let Some(peer) = state.peers.get_mut(conn.id()) {
            let offer_changed = offer.is_some();
            let answer_changed = answer.is_some();
            peer.apply_update(offer, answer, ice_candidate);

            let peer = peer.clone();
            let mut announce = Vec::new();
            if offer_changed {
                announce.push(ServerMessage::Offer {
                    offer: peer.offer.clone().unwrap_or(Value::Null),
                    from_peer_id: peer.peer_id.clone(),
                });
                announce.push(ServerMessage::PeerUpdated {
                    peer_id: peer.peer_id.clone(),
                    offer: peer.offer.clone(),
                    answer: peer.answer.clone(),
                });
            }
            if answer_changed {
                announce.push(ServerMessage::Answer {
                    answer: peer.answer.clone().unwrap_or(Value::Null),
                    from_peer_id: peer.peer_id.clone(),
                });
            }
            for message in announce {
                if let Some(frame) = message.to_frame() {
                    state
                        .rooms
                        .broadcast(&peer.room_id, frame, Some(conn.id()), &mut outbox);
                }
            }
        } else {
            debug!(conn_id = %conn.id(), "update-peer from unregistered connection");
        }

        state.publish_dashboard(&mut outbox, &self.metrics);
        outbox
    }

    async fn relay(
        &self,
        conn: &ConnectionHandle,
        kind: RelayKind,
        payload: Map<String, Value>,
    ) -> Outbox {
        let mut outbox = Outbox::default();
        let state = self.state.read().await;

        let Some(peer) = state.peers.get(conn.id()) else {
            debug!(conn_id = %conn.id(), action = kind.as_action(), "Relay from unregistered connection");
            return outbox;
        };
        if let Some(frame) = relay_frame(payload, &peer.peer_id) {
            state
                .rooms
                .broadcast(&peer.room_id, frame, Some(conn.id()), &mut outbox);
        }
        outbox
    }

    async fn get_peer_updates(&self, conn: &ConnectionHandle, peer_id: &str) -> Outbox {
        let mut outbox = Outbox::default();
        let state = self.state.read().await;

        let Some((_, peer)) = state.peers.find_by_peer_id(peer_id) else {
            debug!(peer_id = %peer_id, "get-peer-updates for unknown peer");
            return outbox;
        };
        let reply = ServerMessage::PeerUpdates {
            offer: peer.offer.clone(),
            answer: peer.answer.clone(),
            ice_candidates: peer.ice_candidates.clone(),
        };
        if let Some(frame) = reply.to_frame() {
            outbox.push(conn, frame);
        }
        outbox
    }

    async fn dashboard_connect(&self, conn: &ConnectionHandle) -> Outbox {
        let mut outbox = Outbox::default();
        let mut state = self.state.write().await;

        if state.dashboard.subscribe(conn.clone()) {
            info!(conn_id = %conn.id(), "Dashboard observer connected");
        }
        let reply = ServerMessage::DashboardConnected {
            snapshot: DashboardSnapshot::from_registry(&state.peers),
        };
        if let Some(frame) = reply.to_frame() {
            outbox.push(conn, frame);
        }
        outbox
    }

    /// Evict every connection registered under `peer_id`. Each one is closed,
    /// dropped from the registry and from its room.
    async fn remove_peer(&self, conn: &ConnectionHandle, peer_id: &str) -> Outbox {
        let mut outbox = Outbox::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let targets = state.peers.connections_with_peer_id(peer_id);
        if targets.is_empty() {
            debug!(peer_id = %peer_id, "remove-peer matched nothing");
            return outbox;
        }

        for target in &targets {
            target.close();
            if let Some(peer) = state.peers.remove(target.id()) {
                state.leave_room(&peer.room_id, target.id(), &peer.peer_id, &mut outbox);
            }
            state.dashboard.unsubscribe(target.id());
        }
        info!(peer_id = %peer_id, count = targets.len(), "Peer removed");
        self.metrics.peers_evicted(targets.len() as u64);

        state.publish_dashboard(&mut outbox, &self.metrics);
        let reply = ServerMessage::PeerRemoved {
            peer_id: peer_id.to_string(),
            success: true,
        };
        if let Some(frame) = reply.to_frame() {
            outbox.push(conn, frame);
        }
        outbox
    }

    fn flush(&self, outbox: Outbox) {
        if outbox.is_empty() {
            return;
        }
        let report = outbox.deliver();
        self.metrics.frames_delivered(report.sent, report.dropped);
    }

    // ── Read-only views (HTTP surface and tests) ────────────────────────

    pub async fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot::from_registry(&self.state.read().await.peers)
    }

    pub async fn peer_count(&self) -> usize {
        self.state.read().await.peers.list().len()
    }

    pub async fn observer_count(&self) -> usize {
        self.state.read().await.dashboard.observer_count()
    }

    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.room_count()
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.state.read().await.rooms.contains(room_id)
    }

    /// Every membership inconsistency between registry and rooms, described.
    /// Empty when the two mirror each other exactly.
    #[cfg(test)]
    pub(crate) async fn membership_violations(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut violations = Vec::new();
        for (handle, peer) in state.peers.iter() {
            let homes: Vec<&str> = state
                .rooms
                .room_ids()
                .filter(|r| state.rooms.members(r).iter().any(|m| m.id() == handle.id()))
                .collect();
            if homes != [peer.room_id.as_str()] {
                violations.push(format!(
                    "peer {} registered in {} but member of {:?}",
                    peer.peer_id, peer.room_id, homes
                ));
            }
        }
        for room_id in state.rooms.room_ids() {
            let members = state.rooms.members(room_id);
            if members.is_empty() {
                violations.push(format!("room {room_id} exists with no members"));
            }
            for m in members {
                match state.peers.get(m.id()) {
                    Some(p) if p.room_id == room_id => {}
                    _ => violations.push(format!("room {room_id} holds a stray connection")),
                }
            }
        }
        violations
    }

    #[cfg(test)]
    pub(crate) async fn ice_candidates_of(&self, conn: &ConnectionHandle) -> Option<Vec<Value>> {
        let state = self.state.read().await;
        state.peers.get(conn.id()).map(|p| p.ice_candidates.clone())
    }
}
