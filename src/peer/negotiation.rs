//! Per-peer offer/answer state machine.
//!
//! A session runs at most one native operation at a time. Everything else
//! waits in a FIFO backlog and is started when the previous completion has
//! been fed back through [`PeerNegotiation::on_completion`]. Callers act on
//! the returned [`Effect`]s: spawn the jobs, send the messages, report the
//! failures.

use crate::config::PeerConnectionParameters;
use crate::error::{EngineError, IceError, NativeOpKind, NegotiationError};
use crate::peer::engine::{NativeJob, NativeOp, NativeOutput, NativePeer, PeerHandle};
use crate::peer::ice::IceCandidateQueue;
use crate::peer::state::NegotiationState;
use crate::peer::types::{IceCandidate, MediaKind, Role, SdpKind, SessionDescription};
use crate::sdp;
use crate::signaling::SignalMessage;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;

const AUDIO_CODEC_OPUS: &str = "opus";

/// Codec preferences applied to every description this client handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecPreferences {
    pub audio_codec: &'static str,
    /// `None` when video is disabled.
    pub video_codec: Option<&'static str>,
    pub audio_start_bitrate_kbps: Option<u32>,
}

impl CodecPreferences {
    pub fn from_params(params: &PeerConnectionParameters) -> Self {
        Self {
            audio_codec: params.audio_codec.sdp_name(),
            video_codec: params
                .video_call_enabled
                .then(|| params.video_codec.sdp_name()),
            audio_start_bitrate_kbps: params.audio_start_bitrate_kbps,
        }
    }

    /// Rewrites a locally created offer or answer before it is applied.
    pub fn rewrite_local(&self, sdp: &str) -> String {
        let mut sdp = sdp::prefer_codec(sdp, self.audio_codec, MediaKind::Audio);
        if let Some(video) = self.video_codec {
            sdp = sdp::prefer_codec(&sdp, video, MediaKind::Video);
        }
        sdp
    }

    /// Rewrites a received answer so the local engine uses the same order.
    pub fn rewrite_remote(&self, sdp: &str) -> String {
        let mut sdp = self.rewrite_local(sdp);
        if let Some(kbps) = self.audio_start_bitrate_kbps.filter(|k| *k > 0) {
            sdp = sdp::set_start_bitrate(&sdp, AUDIO_CODEC_OPUS, MediaKind::Audio, kbps);
        }
        sdp
    }
}

/// What the owner of a session has to do next.
#[derive(Debug)]
pub enum Effect {
    /// Spawn the job and feed its completion back.
    Run(NativeJob),
    /// Send to the remote peer of this session.
    Send(SignalMessage),
    /// The session moved to `Failed`; report upward.
    Failed(NegotiationError),
    /// One candidate could not be applied; log it.
    CandidateFailed(IceError),
}

struct InFlight {
    ticket: u64,
    op: NativeOp,
}

pub struct PeerNegotiation {
    peer_id: String,
    role: Role,
    epoch: u64,
    state: NegotiationState,
    handle: Option<Arc<PeerHandle>>,
    prefs: CodecPreferences,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    pending: IceCandidateQueue,
    answer_received: bool,
    in_flight: Option<InFlight>,
    backlog: VecDeque<NativeOp>,
    next_ticket: u64,
}

impl PeerNegotiation {
    pub fn new(
        peer_id: impl Into<String>,
        role: Role,
        epoch: u64,
        handle: Arc<dyn NativePeer>,
        prefs: CodecPreferences,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            role,
            epoch,
            state: NegotiationState::Created,
            handle: Some(PeerHandle::new(handle)),
            prefs,
            local_description: None,
            remote_description: None,
            pending: IceCandidateQueue::new(),
            answer_received: false,
            in_flight: None,
            backlog: VecDeque::new(),
            next_ticket: 1,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    fn invalid(&self, action: &'static str) -> NegotiationError {
        NegotiationError::InvalidTransition {
            peer_id: self.peer_id.clone(),
            action,
            role: self.role,
            state: self.state,
        }
    }

    /// Offerer only: create, rewrite and apply the local offer, then send it.
    pub fn create_offer(&mut self) -> Result<Vec<Effect>, NegotiationError> {
        if self.role != Role::Offerer || self.state != NegotiationState::Created {
            return Err(self.invalid("create an offer"));
        }
        info!("Creating offer for {}", self.peer_id);
        self.state = NegotiationState::OfferPending;
        self.backlog.push_back(NativeOp::CreateOffer);
        Ok(self.pump())
    }

    /// Answerer only: apply the remote offer, drain queued candidates, then
    /// create, rewrite, apply and send the answer.
    pub fn receive_offer(&mut self, sdp: String) -> Result<Vec<Effect>, NegotiationError> {
        if self.role != Role::Answerer || self.state != NegotiationState::Created {
            return Err(self.invalid("accept an offer"));
        }
        info!("Received offer from {}", self.peer_id);
        self.state = NegotiationState::AnswerPending;
        self.backlog
            .push_back(NativeOp::SetRemote(SessionDescription::offer(sdp)));
        Ok(self.pump())
    }

    /// Offerer only: apply the (rewritten) remote answer and drain queued
    /// candidates.
    pub fn receive_answer(&mut self, sdp: String) -> Result<Vec<Effect>, NegotiationError> {
        if self.role != Role::Offerer
            || self.state != NegotiationState::OfferPending
            || self.answer_received
        {
            return Err(self.invalid("accept an answer"));
        }
        info!("Received answer from {}", self.peer_id);
        self.answer_received = true;
        let answer = SessionDescription::answer(self.prefs.rewrite_remote(&sdp));
        self.backlog.push_back(NativeOp::SetRemote(answer));
        Ok(self.pump())
    }

    /// Applies the candidate once the remote description is in place,
    /// queues it otherwise.
    pub fn receive_candidate(&mut self, candidate: IceCandidate) -> Vec<Effect> {
        if self.state.is_terminal() {
            debug!(
                "Ignoring candidate for {} in state {}",
                self.peer_id, self.state
            );
            return Vec::new();
        }
        if self.remote_description.is_some() {
            self.backlog.push_back(NativeOp::AddCandidate(candidate));
            return self.pump();
        }
        match self.pending.enqueue(candidate) {
            Ok(()) => Vec::new(),
            Err(err) => vec![Effect::CandidateFailed(err)],
        }
    }

    /// Feeds back the completion of the job carrying `ticket`. Completions
    /// that do not match the operation in flight are dropped.
    pub fn on_completion(
        &mut self,
        ticket: u64,
        result: Result<NativeOutput, EngineError>,
    ) -> Vec<Effect> {
        if self.state == NegotiationState::Closed {
            debug!("Late completion for closed session {}", self.peer_id);
            return Vec::new();
        }
        let op = match self.in_flight.take() {
            Some(flight) if flight.ticket == ticket => flight.op,
            other => {
                self.in_flight = other;
                debug!("Stale completion #{ticket} for {}", self.peer_id);
                return Vec::new();
            }
        };

        let mut effects = Vec::new();
        match (op, result) {
            (NativeOp::AddCandidate(_), Ok(_)) => {
                debug!("Successfully added ICE candidate for {}", self.peer_id);
            }
            (NativeOp::AddCandidate(_), Err(err)) => {
                warn!("Failed to add ICE candidate for {}: {err}", self.peer_id);
                effects.push(Effect::CandidateFailed(IceError::AddFailed {
                    peer_id: self.peer_id.clone(),
                    message: err.0,
                }));
            }
            (op, Err(err)) => return self.fail(op.kind(), err.0),
            (NativeOp::CreateOffer | NativeOp::CreateAnswer, Ok(NativeOutput::Description(desc))) => {
                if self.local_description.is_some() {
                    return self.fail_with(NegotiationError::LocalDescriptionAlreadySet {
                        peer_id: self.peer_id.clone(),
                    });
                }
                let rewritten = SessionDescription {
                    kind: desc.kind,
                    sdp: self.prefs.rewrite_local(&desc.sdp),
                };
                self.backlog.push_front(NativeOp::SetLocal(rewritten));
            }
            (op @ (NativeOp::CreateOffer | NativeOp::CreateAnswer), Ok(NativeOutput::Done)) => {
                return self.fail(op.kind(), "engine returned no description".into());
            }
            (NativeOp::SetLocal(desc), Ok(_)) => {
                if self.local_description.is_some() {
                    return self.fail_with(NegotiationError::LocalDescriptionAlreadySet {
                        peer_id: self.peer_id.clone(),
                    });
                }
                let message = match desc.kind {
                    SdpKind::Offer => SignalMessage::Offer {
                        sdp: desc.sdp.clone(),
                    },
                    SdpKind::Answer => SignalMessage::Answer {
                        sdp: desc.sdp.clone(),
                    },
                };
                debug!("Local {} set for {}", message.type_name(), self.peer_id);
                self.local_description = Some(desc);
                effects.push(Effect::Send(message));
                if self.role == Role::Answerer {
                    self.state = NegotiationState::Stable;
                }
            }
            (NativeOp::SetRemote(desc), Ok(_)) => {
                debug!("Remote description set for {}", self.peer_id);
                self.remote_description = Some(desc);
                let backlog = &mut self.backlog;
                let _: Vec<Infallible> = self.pending.drain(|candidate| {
                    backlog.push_back(NativeOp::AddCandidate(candidate));
                    Ok(())
                });
                match self.role {
                    Role::Answerer => self.backlog.push_back(NativeOp::CreateAnswer),
                    Role::Offerer => self.state = NegotiationState::Stable,
                }
            }
        }

        effects.extend(self.pump());
        effects
    }

    /// Marks the session closed and hands back the native handle for
    /// release. Returns `None` if the session was already closed.
    pub fn close(&mut self) -> Option<Arc<PeerHandle>> {
        if self.state == NegotiationState::Closed {
            return None;
        }
        info!("Closing session for {}", self.peer_id);
        self.state = NegotiationState::Closed;
        self.backlog.clear();
        self.in_flight = None;
        self.pending.clear();
        self.handle.take()
    }

    fn fail(&mut self, op: NativeOpKind, message: String) -> Vec<Effect> {
        self.fail_with(NegotiationError::Native {
            peer_id: self.peer_id.clone(),
            op,
            message,
        })
    }

    fn fail_with(&mut self, err: NegotiationError) -> Vec<Effect> {
        error!("{err}");
        self.state = NegotiationState::Failed;
        self.backlog.clear();
        self.in_flight = None;
        vec![Effect::Failed(err)]
    }

    /// Starts the next backlog operation if nothing is in flight.
    fn pump(&mut self) -> Vec<Effect> {
        if self.in_flight.is_some() || self.state.is_terminal() {
            return Vec::new();
        }
        let Some(handle) = self.handle.clone() else {
            return Vec::new();
        };
        let Some(op) = self.backlog.pop_front() else {
            return Vec::new();
        };
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let job = NativeJob::new(self.peer_id.clone(), self.epoch, ticket, handle, op.clone());
        self.in_flight = Some(InFlight { ticket, op });
        vec![Effect::Run(job)]
    }
}
