pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod sdp;
pub mod session;
pub mod signaling;
pub mod utils;

pub use client::{RoomClient, SignalingSink};
pub use config::{AudioCodec, IceServerConfig, IceServerKind, PeerConnectionParameters, RolePolicy, VideoCodec};
pub use error::{
    EngineError, FormatError, IceError, NegotiationError, ProtocolError, RoomFailure, TransportError,
};
pub use peer::connection::WebRtcMediaEngine;
pub use session::{RoomEvent, RoomPhase, SessionOrchestrator};
pub use signaling::{SignalMessage, SignalingChannel, SignalingEvent};
