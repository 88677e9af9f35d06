//! Peer Registry
//!
//! Maps each live connection to its [`Peer`] record. This is the only place a
//! peer is owned; rooms and the dashboard refer to it by [`ConnectionId`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;

use crate::ws::{ConnectionHandle, ConnectionId};

const GENERATED_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A registered negotiation participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub peer_id: String,
    pub room_id: String,
    pub is_source: bool,
    pub registered_at: DateTime<Utc>,
    /// Last offer written; `None` until set.
    pub offer: Option<Value>,
    /// Last answer written; `None` until set.
    pub answer: Option<Value>,
    /// Append-only, in arrival order.
    pub ice_candidates: Vec<Value>,
}

impl Peer {
    /// Merge one `update-peer` into this record. Offer and answer are
    /// last-write-wins; a candidate is appended.
    pub fn apply_update(
        &mut self,
        offer: Option<Value>,
        answer: Option<Value>,
        ice_candidate: Option<Value>,
    ) {
        if let Some(offer) = offer {
            self.offer = Some(offer);
        }
        if let Some(answer) = answer {
            self.answer = Some(answer);
        }
        if let Some(candidate) = ice_candidate {
            self.ice_candidates.push(candidate);
        }
    }
}

struct PeerEntry {
    handle: ConnectionHandle,
    peer: Peer,
    /// Registration order; breaks ties between peers sharing an id.
    seq: u64,
}

/// Registry of peers keyed by connection.
pub struct PeerRegistry {
    entries: HashMap<ConnectionId, PeerEntry>,
    next_seq: u64,
    default_room: String,
}

impl PeerRegistry {
    pub fn new(default_room: impl Into<String>) -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
            default_room: default_room.into(),
        }
    }

    pub fn default_room(&self) -> &str {
        &self.default_room
    }

    /// Create and store a peer for `handle`, replacing any previous record for
    /// the same connection. A missing `peer_id` is generated; a missing or
    /// empty `room_id` resolves to the default room. Caller-supplied ids are
    /// stored as given.
    pub fn register(
        &mut self,
        handle: ConnectionHandle,
        peer_id: Option<String>,
        room_id: Option<String>,
        is_source: bool,
    ) -> &Peer {
        let peer_id = peer_id.unwrap_or_else(|| self.generate_peer_id());
        let room_id = room_id
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.default_room.clone());

        let seq = self.next_seq;
        self.next_seq += 1;

        let id = handle.id();
        let entry = PeerEntry {
            handle,
            peer: Peer {
                peer_id,
                room_id,
                is_source,
                registered_at: Utc::now(),
                offer: None,
                answer: None,
                ice_candidates: Vec::new(),
            },
            seq,
        };
        self.entries.insert(id, entry);
        &self.entries[&id].peer
    }

    pub fn get(&self, connection: ConnectionId) -> Option<&Peer> {
        self.entries.get(&connection).map(|e| &e.peer)
    }

    pub fn get_mut(&mut self, connection: ConnectionId) -> Option<&mut Peer> {
        self.entries.get_mut(&connection).map(|e| &mut e.peer)
    }

    /// The earliest-registered peer carrying `peer_id`.
    pub fn find_by_peer_id(&self, peer_id: &str) -> Option<(&ConnectionHandle, &Peer)> {
        self.entries
            .values()
            .filter(|e| e.peer.peer_id == peer_id)
            .min_by_key(|e| e.seq)
            .map(|e| (&e.handle, &e.peer))
    }

    /// Every connection whose peer carries `peer_id`, in registration order.
    pub fn connections_with_peer_id(&self, peer_id: &str) -> Vec<ConnectionHandle> {
        let mut matches: Vec<&PeerEntry> = self
            .entries
            .values()
            .filter(|e| e.peer.peer_id == peer_id)
            .collect();
        matches.sort_by_key(|e| e.seq);
        matches.into_iter().map(|e| e.handle.clone()).collect()
    }

    /// Whether an open connection other than `except` already holds `peer_id`.
    pub fn is_peer_id_taken(&self, peer_id: &str, except: ConnectionId) -> bool {
        self.entries
            .iter()
            .any(|(id, e)| *id != except && e.peer.peer_id == peer_id && e.handle.is_open())
    }

    /// Remove a connection's peer. Room cleanup is the caller's job.
    pub fn remove(&mut self, connection: ConnectionId) -> Option<Peer> {
        self.entries.remove(&connection).map(|e| e.peer)
    }

    /// Peers whose connection is still open, in registration order.
    pub fn list(&self) -> Vec<&Peer> {
        let mut open: Vec<&PeerEntry> = self
            .entries
            .values()
            .filter(|e| e.handle.is_open())
            .collect();
        open.sort_by_key(|e| e.seq);
        open.into_iter().map(|e| &e.peer).collect()
    }

    /// Every registered connection with its peer, open or not, in no particular order.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionHandle, &Peer)> {
        self.entries.values().map(|e| (&e.handle, &e.peer))
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `peer_<epoch-millis>_<9 base36 chars>`, retried until unused here.
    fn generate_peer_id(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let suffix: String = (0..GENERATED_SUFFIX_LEN)
                .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
                .collect();
            let candidate = format!("peer_{}_{}", Utc::now().timestamp_millis(), suffix);
            if !self.entries.values().any(|e| e.peer.peer_id == candidate) {
                return candidate;
            }
        }
    }
}
