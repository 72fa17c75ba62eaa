pub mod connection;
pub mod engine;
pub mod ice;
pub mod negotiation;
pub mod state;
pub mod types;

pub use engine::{MediaEngine, NativePeer, PeerHandle, PeerObserver};
pub use negotiation::PeerNegotiation;
pub use state::NegotiationState;
pub use types::{IceCandidate, MediaKind, RemoteTrack, Role, SdpKind, SessionDescription};
