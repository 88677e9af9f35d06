//! Signaling Protocol Types
//!
//! JSON messages exchanged with peers and dashboard observers. Every frame is an
//! object carrying an `action` string; action and field names are fixed by the
//! existing browser clients and must not change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;

use super::connection::Frame;
use crate::signaling::DashboardSnapshot;

/// Why an inbound frame was discarded.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has no string `action` field")]
    MissingAction,
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("invalid fields for action: {0}")]
    InvalidField(#[source] serde_json::Error),
}

/// Negotiation messages relayed verbatim to the sender's room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Offer,
    Answer,
    IceCandidate,
}

impl RelayKind {
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            "ice-candidate" => Some(Self::IceCandidate),
            _ => None,
        }
    }

    pub fn as_action(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }
}

const TYPED_ACTIONS: &[&str] = &[
    "register",
    "get-peer",
    "update-peer",
    "get-peer-updates",
    "dashboard-connect",
    "remove-peer",
];

/// Messages sent FROM a peer or observer TO the server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Register {
        #[serde(default)]
        peer_id: Option<String>,
        #[serde(default)]
        room_id: Option<String>,
        #[serde(default, deserialize_with = "truthy")]
        is_source: bool,
    },

    #[serde(rename_all = "camelCase")]
    GetPeer {
        #[serde(default)]
        room_id: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    UpdatePeer {
        #[serde(default, deserialize_with = "present")]
        offer: Option<Value>,
        #[serde(default, deserialize_with = "present")]
        answer: Option<Value>,
        #[serde(default, deserialize_with = "present")]
        ice_candidate: Option<Value>,
    },

    #[serde(rename_all = "camelCase")]
    GetPeerUpdates { peer_id: String },

    DashboardConnect,

    #[serde(rename_all = "camelCase")]
    RemovePeer { peer_id: String },

    /// `offer` / `answer` / `ice-candidate`: the whole inbound object is kept
    /// so it can be re-broadcast untouched.
    #[serde(skip)]
    Relay {
        kind: RelayKind,
        payload: Map<String, Value>,
    },
}

impl ClientMessage {
    /// Parse one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Json)?;
        let Value::Object(payload) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingAction)?;

        if let Some(kind) = RelayKind::from_action(action) {
            return Ok(Self::Relay { kind, payload });
        }
        if !TYPED_ACTIONS.contains(&action) {
            return Err(ProtocolError::UnknownAction(action.to_string()));
        }
        serde_json::from_value(Value::Object(payload)).map_err(ProtocolError::InvalidField)
    }

    /// Action name, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::GetPeer { .. } => "get-peer",
            Self::UpdatePeer { .. } => "update-peer",
            Self::GetPeerUpdates { .. } => "get-peer-updates",
            Self::DashboardConnect => "dashboard-connect",
            Self::RemovePeer { .. } => "remove-peer",
            Self::Relay { kind, .. } => kind.as_action(),
        }
    }
}

/// JSON truthiness, as the browser clients use it: `null`, `false`, `0` and
/// `""` are all "not set".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(is_truthy(&Value::deserialize(deserializer)?))
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(is_truthy(&value).then_some(value))
}

/// The source peer reported by `peer-found`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundPeer {
    pub peer_id: String,
    pub offer: Option<Value>,
    pub is_source: bool,
}

/// Messages sent FROM the server TO a peer or observer
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Registered {
        peer_id: String,
        room_id: String,
        is_source: bool,
    },

    #[serde(rename_all = "camelCase")]
    RegisterRejected { peer_id: String, reason: String },

    PeerFound { peer: FoundPeer },

    PeerNotFound,

    #[serde(rename_all = "camelCase")]
    Offer { offer: Value, from_peer_id: String },

    #[serde(rename_all = "camelCase")]
    Answer { answer: Value, from_peer_id: String },

    #[serde(rename_all = "camelCase")]
    PeerUpdated {
        peer_id: String,
        offer: Option<Value>,
        answer: Option<Value>,
    },

    #[serde(rename_all = "camelCase")]
    PeerUpdates {
        offer: Option<Value>,
        answer: Option<Value>,
        ice_candidates: Vec<Value>,
    },

    #[serde(rename_all = "camelCase")]
    PeerLeft { peer_id: String },

    #[serde(rename_all = "camelCase")]
    PeerRemoved { peer_id: String, success: bool },

    DashboardConnected {
        #[serde(flatten)]
        snapshot: DashboardSnapshot,
    },

    DashboardUpdate {
        #[serde(flatten)]
        snapshot: DashboardSnapshot,
    },
}

impl ServerMessage {
    /// Serialize into a shareable frame. Serialization of these types cannot
    /// realistically fail; if it does the message is logged and skipped.
    pub fn to_frame(&self) -> Option<Frame> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Frame::from(json)),
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                None
            }
        }
    }
}

/// Frame for a relayed negotiation message: the inbound object plus `fromPeerId`.
pub fn relay_frame(mut payload: Map<String, Value>, from_peer_id: &str) -> Option<Frame> {
    payload.insert(
        "fromPeerId".to_string(),
        Value::String(from_peer_id.to_string()),
    );
    match serde_json::to_string(&payload) {
        Ok(json) => Some(Frame::from(json)),
        Err(e) => {
            error!("Failed to serialize relay payload: {}", e);
            None
        }
    }
}
