//! Room Manager
//!
//! Rooms exist only while they have members: `join` creates one on demand and
//! `leave` deletes it the moment its last member goes. Membership holds
//! connection handles, never peer records.

use std::collections::HashMap;

use super::outbox::Outbox;
use crate::ws::{ConnectionHandle, ConnectionId, Frame};

/// Outcome of removing a connection from a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leave {
    /// The connection was not a member (or the room did not exist).
    NotMember,
    /// Removed; this many members remain.
    Remaining(usize),
    /// Removed the last member; the room no longer exists.
    RoomDeleted,
}

#[derive(Default)]
pub struct RoomManager {
    /// room_id -> members in join order
    rooms: HashMap<String, Vec<ConnectionHandle>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handle` to `room_id`, creating the room if needed. Joining twice is a no-op.
    pub fn join(&mut self, room_id: &str, handle: ConnectionHandle) {
        let members = self.rooms.entry(room_id.to_string()).or_default();
        if !members.iter().any(|m| m.id() == handle.id()) {
            members.push(handle);
        }
    }

    pub fn leave(&mut self, room_id: &str, connection: ConnectionId) -> Leave {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return Leave::NotMember;
        };
        let before = members.len();
        members.retain(|m| m.id() != connection);
        if members.len() == before {
            return Leave::NotMember;
        }
        if members.is_empty() {
            self.rooms.remove(room_id);
            Leave::RoomDeleted
        } else {
            Leave::Remaining(members.len())
        }
    }

    /// Members of `room_id` in join order; an unknown room has none.
    pub fn members(&self, room_id: &str) -> &[ConnectionHandle] {
        self.rooms.get(room_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    #[cfg(test)]
    pub fn room_ids(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }

    /// Queue `frame` for every open member except `exclude`. Delivery happens
    /// when the outbox is flushed, after the caller has released shared state.
    pub fn broadcast(
        &self,
        room_id: &str,
        frame: Frame,
        exclude: Option<ConnectionId>,
        outbox: &mut Outbox,
    ) {
        let targets: Vec<ConnectionHandle> = self
            .members(room_id)
            .iter()
            .filter(|m| Some(m.id()) != exclude && m.is_open())
            .cloned()
            .collect();
        outbox.push_many(targets, frame);
    }
}
