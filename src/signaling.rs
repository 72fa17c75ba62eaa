use crate::error::{ProtocolError, TransportError};
use crate::peer::types::IceCandidate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Room signaling transport. Implementations deliver inbound traffic as
/// [`SignalingEvent`]s through a [`crate::client::SignalingSink`].
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Connects to the server and returns the participant id it assigned
    /// to this client.
    async fn connect(&self, url: &str) -> Result<String, TransportError>;
    async fn join(&self, room: &str) -> Result<(), TransportError>;
    async fn leave(&self, room: &str) -> Result<(), TransportError>;
    /// Sends a JSON object payload to one member of the room.
    async fn send(&self, room: &str, target: &str, payload: Value) -> Result<(), TransportError>;
}

/// Inbound transport callbacks, as the room worker consumes them.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Connecting,
    Connected,
    ConnectError {
        reason: String,
    },
    /// `id` is either our own id (join confirmation, with the members
    /// already present in `others`) or a member who joined after us.
    Joined {
        room: String,
        id: String,
        others: Vec<String>,
    },
    Leaved {
        room: String,
        id: String,
    },
    RoomFull {
        room: String,
    },
    Message {
        from: String,
        to: String,
        payload: Value,
    },
}

/// Peer-to-peer payload carried inside a signaling message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
    },
    Candidate {
        /// sdpMid
        id: String,
        /// sdpMLineIndex
        label: u16,
        candidate: String,
    },
}

impl SignalMessage {
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        match kind {
            "offer" | "answer" | "candidate" => {
                serde_json::from_value(value.clone()).map_err(|e| ProtocolError::Malformed {
                    kind: kind.to_owned(),
                    reason: e.to_string(),
                })
            }
            other => Err(ProtocolError::UnknownType(other.to_owned())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            SignalMessage::Offer { sdp } => json!({ "type": "offer", "sdp": sdp }),
            SignalMessage::Answer { sdp } => json!({ "type": "answer", "sdp": sdp }),
            SignalMessage::Candidate {
                id,
                label,
                candidate,
            } => json!({
                "type": "candidate",
                "id": id,
                "label": label,
                "candidate": candidate,
            }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::Candidate { .. } => "candidate",
        }
    }
}

impl From<IceCandidate> for SignalMessage {
    fn from(c: IceCandidate) -> Self {
        SignalMessage::Candidate {
            id: c.sdp_mid.unwrap_or_default(),
            label: c.sdp_mline_index,
            candidate: c.candidate,
        }
    }
}

impl IceCandidate {
    pub(crate) fn from_wire(id: String, label: u16, candidate: String) -> Self {
        IceCandidate {
            candidate,
            sdp_mid: Some(id),
            sdp_mline_index: label,
        }
    }
}
