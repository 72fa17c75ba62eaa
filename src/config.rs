use crate::peer::types::Role;
use serde::{Deserialize, Serialize};

// Logging is compiled in for debug builds only; release builds stay silent.

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false;

#[cfg(debug_assertions)]
pub mod dev {
    /// Flip to false to silence the console logger in debug builds.
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Audio codecs the rewriter knows how to prefer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioCodec {
    #[default]
    #[serde(rename = "opus")]
    Opus,
    #[serde(rename = "ISAC")]
    Isac,
}

impl AudioCodec {
    pub fn sdp_name(self) -> &'static str {
        match self {
            AudioCodec::Opus => "opus",
            AudioCodec::Isac => "ISAC",
        }
    }
}

/// Video codecs as the application labels them. Both H264 profiles
/// share one rtpmap name.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    #[serde(rename = "VP8")]
    Vp8,
    #[serde(rename = "VP9")]
    Vp9,
    #[default]
    #[serde(rename = "H264 Baseline")]
    H264Baseline,
    #[serde(rename = "H264 High")]
    H264High,
    #[serde(rename = "AV1")]
    Av1,
}

impl VideoCodec {
    pub fn sdp_name(self) -> &'static str {
        match self {
            VideoCodec::Vp8 => "VP8",
            VideoCodec::Vp9 => "VP9",
            VideoCodec::H264Baseline | VideoCodec::H264High => "H264",
            VideoCodec::Av1 => "AV1",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IceServerKind {
    Stun,
    Turn,
}

/// One STUN/TURN server entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    pub url: String,
    pub kind: IceServerKind,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

/// How a new peer session picks its role.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RolePolicy {
    /// Members already in the room offer; the newcomer answers.
    #[default]
    JoinOrder,
    /// Every session takes this role regardless of join order.
    Fixed(Role),
}

/// Per-client negotiation settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PeerConnectionParameters {
    pub audio_call_enabled: bool,
    pub video_call_enabled: bool,
    pub audio_codec: AudioCodec,
    pub video_codec: VideoCodec,
    pub audio_start_bitrate_kbps: Option<u32>,
    pub ice_servers: Vec<IceServerConfig>,
    pub role_policy: RolePolicy,
}

impl Default for PeerConnectionParameters {
    fn default() -> Self {
        Self {
            audio_call_enabled: true,
            video_call_enabled: true,
            audio_codec: AudioCodec::default(),
            video_codec: VideoCodec::default(),
            audio_start_bitrate_kbps: None,
            ice_servers: default_ice_servers(),
            role_policy: RolePolicy::default(),
        }
    }
}

impl PeerConnectionParameters {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

pub fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig {
            url: "stun:stun.l.google.com:19302".into(),
            kind: IceServerKind::Stun,
            username: None,
            credential: None,
        },
        IceServerConfig {
            url: "stun:stun1.l.google.com:19302".into(),
            kind: IceServerKind::Stun,
            username: None,
            credential: None,
        },
    ]
}
