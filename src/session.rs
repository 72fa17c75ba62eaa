//! Room-level orchestration: one [`SessionOrchestrator`] per joined room.
//!
//! The orchestrator is owned by the room worker task (see
//! [`crate::client`]) and is only ever touched from that task. Transport
//! callbacks, native completions and native observer notices all reach it
//! as [`WorkerEvent`]s on the worker queue.

use crate::config::{PeerConnectionParameters, RolePolicy};
use crate::error::{NegotiationError, ProtocolError, RoomFailure, TransportError};
use crate::logger::dump_candidate;
use crate::peer::engine::{MediaEngine, NativeCompletion, PeerHandle, PeerObserver};
use crate::peer::negotiation::{CodecPreferences, Effect, PeerNegotiation};
use crate::peer::state::NegotiationState;
use crate::peer::types::{IceCandidate, RemoteTrack, Role};
use crate::signaling::{SignalMessage, SignalingChannel, SignalingEvent};
use crate::utils::random_id;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Events the application sees.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Connecting,
    Connected,
    Failed(RoomFailure),
    AddRemoteStream { peer_id: String, track: RemoteTrack },
    RemoveRemoteStream { peer_id: String },
}

/// Everything the room worker consumes, in arrival order.
pub(crate) enum WorkerEvent {
    Join {
        url: String,
    },
    Signaling(SignalingEvent),
    Completed(NativeCompletion),
    LocalCandidate {
        peer_id: String,
        epoch: u64,
        candidate: IceCandidate,
    },
    RemoteTrack {
        peer_id: String,
        epoch: u64,
        track: RemoteTrack,
    },
    Inspect(Inspect),
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Read-only queries answered by the worker.
pub(crate) enum Inspect {
    State {
        peer_id: String,
        reply: oneshot::Sender<Option<NegotiationState>>,
    },
    Role {
        peer_id: String,
        reply: oneshot::Sender<Option<Role>>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Idle,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// How a session came to exist, which decides its role under
/// [`RolePolicy::JoinOrder`].
#[derive(Debug, Clone, Copy)]
enum Arrival {
    /// Already in the room when we joined.
    Existing,
    /// Joined after us.
    Newcomer,
}

pub struct SessionOrchestrator {
    session_id: String,
    room: String,
    url: Option<String>,
    phase: RoomPhase,
    local_id: Option<String>,
    peers: HashMap<String, PeerNegotiation>,
    policy: RolePolicy,
    prefs: CodecPreferences,
    engine: Arc<dyn MediaEngine>,
    signaling: Arc<dyn SignalingChannel>,
    events: mpsc::UnboundedSender<RoomEvent>,
    worker: mpsc::UnboundedSender<WorkerEvent>,
    next_epoch: u64,
}

impl SessionOrchestrator {
    pub(crate) fn new(
        room: impl Into<String>,
        params: &PeerConnectionParameters,
        engine: Arc<dyn MediaEngine>,
        signaling: Arc<dyn SignalingChannel>,
        events: mpsc::UnboundedSender<RoomEvent>,
        worker: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        Self {
            session_id: random_id(),
            room: room.into(),
            url: None,
            phase: RoomPhase::Idle,
            local_id: None,
            peers: HashMap::new(),
            policy: params.role_policy,
            prefs: CodecPreferences::from_params(params),
            engine,
            signaling,
            events,
            worker,
            next_epoch: 1,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peer_state(&self, peer_id: &str) -> Option<NegotiationState> {
        self.peers.get(peer_id).map(PeerNegotiation::state)
    }

    pub fn peer_role(&self, peer_id: &str) -> Option<Role> {
        self.peers.get(peer_id).map(PeerNegotiation::role)
    }

    fn emit(&self, event: RoomEvent) {
        if self.events.send(event).is_err() {
            debug!("[{}] application dropped its event receiver", self.session_id);
        }
    }

    pub(crate) fn answer(&self, query: Inspect) {
        match query {
            Inspect::State { peer_id, reply } => {
                let _ = reply.send(self.peer_state(&peer_id));
            }
            Inspect::Role { peer_id, reply } => {
                let _ = reply.send(self.peer_role(&peer_id));
            }
            Inspect::Count { reply } => {
                let _ = reply.send(self.peer_count());
            }
        }
    }

    /// Connects the transport; on success joins the room.
    pub async fn connect(&mut self, url: &str) {
        self.url = Some(url.to_owned());
        self.on_connecting();
        match self.signaling.connect(url).await {
            Ok(local_id) => {
                debug!("[{}] server assigned id {local_id}", self.session_id);
                self.local_id = Some(local_id);
                self.on_connected().await
            }
            Err(err) => self.fail_room(RoomFailure::Transport(err)),
        }
    }

    pub async fn on_signaling(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Connecting => self.on_connecting(),
            SignalingEvent::Connected => self.on_connected().await,
            SignalingEvent::ConnectError { reason } => self.on_connect_error(reason),
            SignalingEvent::Joined { room, id, others } => self.on_joined(&room, id, others).await,
            SignalingEvent::Leaved { room, id } => self.on_leaved(&room, &id),
            SignalingEvent::RoomFull { room } => self.on_room_full(room),
            SignalingEvent::Message { from, to, payload } => {
                self.on_message(&from, &to, &payload).await
            }
        }
    }

    pub fn on_connecting(&mut self) {
        if self.phase == RoomPhase::Idle {
            self.phase = RoomPhase::Connecting;
            info!("[{}] connecting to room {}", self.session_id, self.room);
            self.emit(RoomEvent::Connecting);
        }
    }

    pub async fn on_connected(&mut self) {
        if self.phase != RoomPhase::Connecting {
            debug!("[{}] ignoring connected in phase {:?}", self.session_id, self.phase);
            return;
        }
        self.phase = RoomPhase::Connected;
        if let Err(err) = self.signaling.join(&self.room).await {
            self.fail_room(RoomFailure::Transport(err));
            return;
        }
        info!("[{}] connected, joining room {}", self.session_id, self.room);
        self.emit(RoomEvent::Connected);
    }

    pub fn on_connect_error(&mut self, reason: String) {
        let url = self.url.clone().unwrap_or_default();
        self.fail_room(RoomFailure::Transport(TransportError::Connect { url, reason }));
    }

    pub fn on_room_full(&mut self, room: String) {
        self.fail_room(RoomFailure::RoomFull(room));
    }

    fn fail_room(&mut self, failure: RoomFailure) {
        error!("[{}] room {} failed: {failure}", self.session_id, self.room);
        self.teardown();
        self.phase = RoomPhase::Failed;
        self.emit(RoomEvent::Failed(failure));
    }

    fn role_for(&self, arrival: Arrival) -> Role {
        match (self.policy, arrival) {
            (RolePolicy::Fixed(role), _) => role,
            (RolePolicy::JoinOrder, Arrival::Existing) => Role::Answerer,
            (RolePolicy::JoinOrder, Arrival::Newcomer) => Role::Offerer,
        }
    }

    /// Our own join confirmation creates answerer sessions for everyone
    /// already present; a join by anyone else creates an offerer session
    /// for them. Our id comes from the connect result; without one, the
    /// first join event is taken as ours.
    pub async fn on_joined(&mut self, room: &str, id: String, others: Vec<String>) {
        if room != self.room {
            warn!("[{}] join event for foreign room {room}", self.session_id);
            return;
        }
        if matches!(self.phase, RoomPhase::Failed | RoomPhase::Closed) {
            debug!("[{}] ignoring join of {id} after teardown", self.session_id);
            return;
        }

        let own_join = if self.local_id.is_none() {
            info!("[{}] joined room {room} with id {id}", self.session_id);
            self.local_id = Some(id.clone());
            true
        } else {
            self.local_id.as_deref() == Some(id.as_str())
        };

        if own_join {
            if others.is_empty() {
                debug!("[{}] nobody else in room {room}", self.session_id);
            }
            for other in others {
                if other == id {
                    continue;
                }
                let role = self.role_for(Arrival::Existing);
                self.add_peer(other, role).await;
            }
        } else {
            info!("[{}] remote client {id} joined room {room}", self.session_id);
            let role = self.role_for(Arrival::Newcomer);
            self.add_peer(id, role).await;
        }
    }

    async fn add_peer(&mut self, peer_id: String, role: Role) {
        if self.peers.contains_key(&peer_id) {
            debug!("[{}] session for {peer_id} already exists", self.session_id);
            return;
        }
        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let observer = PeerObserver::new(peer_id.clone(), epoch, self.worker.clone());
        let handle = match self.engine.create_peer_connection(&peer_id, observer).await {
            Ok(handle) => handle,
            Err(err) => {
                let failure = NegotiationError::PeerCreation {
                    peer_id,
                    message: err.0,
                };
                error!("[{}] {failure}", self.session_id);
                self.emit(RoomEvent::Failed(failure.into()));
                return;
            }
        };

        info!("[{}] created {role} session for {peer_id}", self.session_id);
        let mut session =
            PeerNegotiation::new(peer_id.clone(), role, epoch, handle, self.prefs.clone());
        let effects = match role {
            Role::Offerer => session.create_offer(),
            Role::Answerer => Ok(Vec::new()),
        };
        self.peers.insert(peer_id.clone(), session);
        match effects {
            Ok(effects) => self.apply(&peer_id, effects).await,
            Err(err) => warn!("[{}] {err}", self.session_id),
        }
    }

    /// Removes and releases the session for `peer_id`; a no-op if there is
    /// none.
    pub fn on_leaved(&mut self, room: &str, peer_id: &str) {
        if room != self.room {
            warn!("[{}] leave event for foreign room {room}", self.session_id);
            return;
        }
        match self.peers.remove(peer_id) {
            Some(mut session) => {
                info!("[{}] {peer_id} left room {room}", self.session_id);
                release(peer_id, session.close());
                self.emit(RoomEvent::RemoveRemoteStream {
                    peer_id: peer_id.to_owned(),
                });
            }
            None => debug!("[{}] leave for unknown peer {peer_id}", self.session_id),
        }
    }

    pub async fn on_message(&mut self, from: &str, to: &str, payload: &Value) {
        if let Some(local) = self.local_id.as_deref() {
            if !to.is_empty() && to != local {
                let err = ProtocolError::Misrouted { to: to.to_owned() };
                warn!("[{}] dropping message from {from}: {err}", self.session_id);
                return;
            }
        }
        let message = match SignalMessage::from_value(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!("[{}] dropping message from {from}: {err}", self.session_id);
                return;
            }
        };
        let Some(session) = self.peers.get_mut(from) else {
            let err = ProtocolError::UnknownPeer(from.to_owned());
            warn!(
                "[{}] dropping {} message: {err}",
                self.session_id,
                message.type_name()
            );
            return;
        };

        let kind = message.type_name();
        let effects = match message {
            SignalMessage::Offer { sdp } => session.receive_offer(sdp),
            SignalMessage::Answer { sdp } => session.receive_answer(sdp),
            SignalMessage::Candidate {
                id,
                label,
                candidate,
            } => {
                let candidate = IceCandidate::from_wire(id, label, candidate);
                dump_candidate("REMOTE", from, &candidate);
                Ok(session.receive_candidate(candidate))
            }
        };
        match effects {
            Ok(effects) => self.apply(from, effects).await,
            Err(err) => warn!("[{}] dropping {kind} from {from}: {err}", self.session_id),
        }
    }

    pub async fn on_native_completion(&mut self, completion: NativeCompletion) {
        let Some(session) = self
            .peers
            .get_mut(&completion.peer_id)
            .filter(|s| s.epoch() == completion.epoch)
        else {
            debug!(
                "[{}] completion for released session {} dropped",
                self.session_id, completion.peer_id
            );
            return;
        };
        let effects = session.on_completion(completion.ticket, completion.result);
        self.apply(&completion.peer_id, effects).await;
    }

    /// Relays a locally gathered candidate to the remote peer.
    pub async fn on_local_candidate(&mut self, peer_id: &str, epoch: u64, candidate: IceCandidate) {
        let live = self
            .peers
            .get(peer_id)
            .is_some_and(|s| s.epoch() == epoch && !s.state().is_terminal());
        if !live {
            debug!("[{}] local candidate for gone session {peer_id}", self.session_id);
            return;
        }
        dump_candidate("LOCAL", peer_id, &candidate);
        self.send(peer_id, SignalMessage::from(candidate)).await;
    }

    pub fn on_remote_track(&mut self, peer_id: &str, epoch: u64, track: RemoteTrack) {
        if !self.peers.get(peer_id).is_some_and(|s| s.epoch() == epoch) {
            debug!("[{}] remote track for gone session {peer_id}", self.session_id);
            return;
        }
        info!("[{}] remote {} track from {peer_id}", self.session_id, track.kind);
        self.emit(RoomEvent::AddRemoteStream {
            peer_id: peer_id.to_owned(),
            track,
        });
    }

    /// Leaves the room on the transport, then releases every session.
    pub async fn close(&mut self) {
        if self.phase == RoomPhase::Closed {
            return;
        }
        if self.phase == RoomPhase::Connected {
            if let Err(err) = self.signaling.leave(&self.room).await {
                warn!("[{}] {err}", self.session_id);
            }
        }
        self.teardown();
        self.phase = RoomPhase::Closed;
        info!("[{}] room {} closed", self.session_id, self.room);
    }

    fn teardown(&mut self) {
        let peers: Vec<(String, PeerNegotiation)> = self.peers.drain().collect();
        for (peer_id, mut session) in peers {
            release(&peer_id, session.close());
            self.emit(RoomEvent::RemoveRemoteStream { peer_id });
        }
    }

    async fn apply(&mut self, peer_id: &str, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Run(job) => {
                    let worker = self.worker.clone();
                    tokio::spawn(async move {
                        let completion = job.run().await;
                        let _ = worker.send(WorkerEvent::Completed(completion));
                    });
                }
                Effect::Send(message) => self.send(peer_id, message).await,
                Effect::Failed(err) => self.emit(RoomEvent::Failed(err.into())),
                Effect::CandidateFailed(err) => {
                    debug!("[{}] {err}", self.session_id);
                }
            }
        }
    }

    async fn send(&self, target: &str, message: SignalMessage) {
        debug!("[{}] send {} to {target}", self.session_id, message.type_name());
        if let Err(err) = self
            .signaling
            .send(&self.room, target, message.to_value())
            .await
        {
            error!("[{}] {err}", self.session_id);
            self.emit(RoomEvent::Failed(err.into()));
        }
    }
}

/// Closes a released native handle off the worker, after any operation
/// still running on it.
fn release(peer_id: &str, handle: Option<Arc<PeerHandle>>) {
    let Some(handle) = handle else {
        return;
    };
    let peer_id = peer_id.to_owned();
    tokio::spawn(async move {
        if let Err(err) = handle.release().await {
            warn!("Failed to close peer connection {peer_id}: {err}");
        }
    });
}
