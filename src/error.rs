use crate::peer::state::NegotiationState;
use crate::peer::types::Role;
use std::fmt;
use thiserror::Error;

/// Failure reported by the native media engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl From<webrtc::Error> for EngineError {
    fn from(err: webrtc::Error) -> Self {
        EngineError(err.to_string())
    }
}

/// Signaling transport failures. Room-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("join room {room} failed: {reason}")]
    Join { room: String, reason: String },
    #[error("leave room {room} failed: {reason}")]
    Leave { room: String, reason: String },
    #[error("send to {target} failed: {reason}")]
    Send { target: String, reason: String },
    #[error("room worker is no longer running")]
    WorkerGone,
}

/// Native operations a peer session drives, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOpKind {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
    AddIceCandidate,
}

impl fmt::Display for NativeOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NativeOpKind::CreateOffer => "createOffer",
            NativeOpKind::CreateAnswer => "createAnswer",
            NativeOpKind::SetLocalDescription => "setLocalDescription",
            NativeOpKind::SetRemoteDescription => "setRemoteDescription",
            NativeOpKind::AddIceCandidate => "addIceCandidate",
        };
        f.write_str(name)
    }
}

/// Peer-scoped SDP failures. The affected session moves to `Failed`;
/// other peers carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("peer {peer_id}: {op} failed: {message}")]
    Native {
        peer_id: String,
        op: NativeOpKind,
        message: String,
    },
    #[error("peer {peer_id}: cannot {action} as {role} in state {state}")]
    InvalidTransition {
        peer_id: String,
        action: &'static str,
        role: Role,
        state: NegotiationState,
    },
    #[error("peer {peer_id}: local description already set for this round")]
    LocalDescriptionAlreadySet { peer_id: String },
    #[error("peer {peer_id}: peer connection creation failed: {message}")]
    PeerCreation { peer_id: String, message: String },
}

impl NegotiationError {
    pub fn peer_id(&self) -> &str {
        match self {
            NegotiationError::Native { peer_id, .. }
            | NegotiationError::InvalidTransition { peer_id, .. }
            | NegotiationError::LocalDescriptionAlreadySet { peer_id }
            | NegotiationError::PeerCreation { peer_id, .. } => peer_id,
        }
    }
}

/// A single candidate could not be applied. Best effort, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IceError {
    #[error("peer {peer_id}: add candidate failed: {message}")]
    AddFailed { peer_id: String, message: String },
    #[error("candidate queue already drained for this negotiation round")]
    QueueDrained,
}

/// Malformed or unroutable signaling input. Logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("message has no string `type` field")]
    MissingType,
    #[error("unrecognized message type `{0}`")]
    UnknownType(String),
    #[error("malformed `{kind}` message: {reason}")]
    Malformed { kind: String, reason: String },
    #[error("no session for peer {0}")]
    UnknownPeer(String),
    #[error("message addressed to {to}, not to us")]
    Misrouted { to: String },
}

/// Rewriter diagnostics. The rewriter hands back its input when it sees one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("wrong SDP media description format: {0}")]
    MalformedMediaLine(String),
}

/// Terminal or peer-level failure surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("room {0} is full")]
    RoomFull(String),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}
