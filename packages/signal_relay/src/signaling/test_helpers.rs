use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::ws::{ConnectionHandle, ConnectionId, Frame};

/// Owns the receiving ends of test connections so their handles stay open,
/// and decodes whatever the signaling core queued for each of them.
#[derive(Default)]
pub(crate) struct Connections {
    receivers: HashMap<ConnectionId, mpsc::Receiver<Frame>>,
}

impl Connections {
    pub fn open(&mut self) -> ConnectionHandle {
        let (handle, rx) = ConnectionHandle::new(64);
        self.receivers.insert(handle.id(), rx);
        handle
    }

    /// Every frame queued for `handle` so far, parsed as JSON.
    pub fn drain(&mut self, handle: &ConnectionHandle) -> Vec<Value> {
        let rx = self
            .receivers
            .get_mut(&handle.id())
            .expect("unknown test connection");
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("frame is JSON"));
        }
        frames
    }

    /// Actions of every frame queued for `handle` so far.
    pub fn actions(&mut self, handle: &ConnectionHandle) -> Vec<String> {
        self.drain(handle)
            .into_iter()
            .map(|v| v["action"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}
