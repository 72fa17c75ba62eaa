use crate::config::{IceServerConfig, PeerConnectionParameters};
use crate::error::EngineError;
use crate::peer::engine::{MediaEngine, NativePeer, PeerObserver};
use crate::peer::types::{IceCandidate, MediaKind, RemoteTrack, SdpKind, SessionDescription};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::any::Any;
use std::sync::Arc;
use webrtc::api::media_engine::MediaEngine as RtcMediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// [`MediaEngine`] backed by the `webrtc` crate.
pub struct WebRtcMediaEngine {
    api: API,
    ice_servers: Vec<IceServerConfig>,
    audio: bool,
    video: bool,
}

impl WebRtcMediaEngine {
    pub fn new(params: &PeerConnectionParameters) -> Result<Self, EngineError> {
        let mut media = RtcMediaEngine::default();
        media.register_default_codecs()?;
        let api = APIBuilder::new().with_media_engine(media).build();
        Ok(Self {
            api,
            ice_servers: params.ice_servers.clone(),
            audio: params.audio_call_enabled,
            video: params.video_call_enabled,
        })
    }

    fn rtc_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: rtc_ice_servers(&self.ice_servers),
            bundle_policy: RTCBundlePolicy::MaxBundle,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
            ..Default::default()
        }
    }
}

fn rtc_ice_servers(servers: &[IceServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

#[async_trait]
impl MediaEngine for WebRtcMediaEngine {
    async fn create_peer_connection(
        &self,
        peer_id: &str,
        observer: PeerObserver,
    ) -> Result<Arc<dyn NativePeer>, EngineError> {
        let pc = Arc::new(self.api.new_peer_connection(self.rtc_config()).await?);

        // receive-side sections so offers carry m=audio / m=video
        if self.audio {
            pc.add_transceiver_from_kind(RTPCodecType::Audio, None).await?;
        }
        if self.video {
            pc.add_transceiver_from_kind(RTPCodecType::Video, None).await?;
        }

        let candidates = observer.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            match cand {
                Some(c) => match c.to_json() {
                    Ok(init) => candidates.on_ice_candidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index.unwrap_or_default(),
                    }),
                    Err(e) => warn!("Failed to serialize local candidate: {e}"),
                },
                None => debug!(
                    "ICE candidate gathering completed for {}",
                    candidates.peer_id()
                ),
            }
            Box::pin(async {})
        }));

        let tracks = observer.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let kind = match track.kind() {
                    RTPCodecType::Audio => MediaKind::Audio,
                    _ => MediaKind::Video,
                };
                let id = track.id();
                let native: Arc<dyn Any + Send + Sync> = track;
                tracks.on_remote_track(RemoteTrack {
                    id,
                    kind,
                    native: Some(native),
                });
                Box::pin(async {})
            },
        ));

        let label = peer_id.to_owned();
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            info!("Peer connection {label} state changed to: {st:?}");
            Box::pin(async {})
        }));

        Ok(Arc::new(WebRtcPeer { pc }))
    }
}

/// One `RTCPeerConnection` behind the [`NativePeer`] seam.
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    let rtc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription, EngineError> {
    let kind = match desc.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        other => return Err(EngineError(format!("unexpected description type {other}"))),
    };
    Ok(SessionDescription {
        kind,
        sdp: desc.sdp,
    })
}

#[async_trait]
impl NativePeer for WebRtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        from_rtc(self.pc.create_offer(None).await?)
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        from_rtc(self.pc.create_answer(None).await?)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        Ok(self.pc.set_local_description(to_rtc(desc)?).await?)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        Ok(self.pc.set_remote_description(to_rtc(desc)?).await?)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: Some(candidate.sdp_mline_index),
            username_fragment: None,
        };
        Ok(self.pc.add_ice_candidate(init).await?)
    }

    async fn close(&self) -> Result<(), EngineError> {
        Ok(self.pc.close().await?)
    }
}
