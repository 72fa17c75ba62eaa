//! Application-facing handle for one room.
//!
//! [`RoomClient::start`] spawns the room worker. Everything that touches
//! session state (transport callbacks, native completions, queries) is
//! posted to that worker and processed in arrival order.

use crate::config::PeerConnectionParameters;
use crate::error::TransportError;
use crate::peer::engine::MediaEngine;
use crate::peer::state::NegotiationState;
use crate::peer::types::Role;
use crate::session::{Inspect, RoomEvent, SessionOrchestrator, WorkerEvent};
use crate::signaling::{SignalingChannel, SignalingEvent};
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Entry point for transports: hands inbound events to the room worker.
#[derive(Clone)]
pub struct SignalingSink {
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl SignalingSink {
    pub fn deliver(&self, event: SignalingEvent) -> Result<(), TransportError> {
        self.tx
            .send(WorkerEvent::Signaling(event))
            .map_err(|_| TransportError::WorkerGone)
    }
}

/// Dropping the client without [`RoomClient::leave`] still leaves the
/// room and releases every session, just without waiting for it.
pub struct RoomClient {
    room: String,
    tx: mpsc::UnboundedSender<WorkerEvent>,
    worker: Option<JoinHandle<()>>,
}

impl RoomClient {
    /// Spawns the worker for `room`. Must be called inside a tokio runtime.
    pub fn start(
        room: impl Into<String>,
        params: &PeerConnectionParameters,
        engine: Arc<dyn MediaEngine>,
        signaling: Arc<dyn SignalingChannel>,
    ) -> (Self, mpsc::UnboundedReceiver<RoomEvent>) {
        let room = room.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let orchestrator =
            SessionOrchestrator::new(room.clone(), params, engine, signaling, events_tx, tx.clone());
        let worker = tokio::spawn(run(orchestrator, rx));
        let client = Self {
            room,
            tx,
            worker: Some(worker),
        };
        (client, events_rx)
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn signaling_sink(&self) -> SignalingSink {
        SignalingSink {
            tx: self.tx.clone(),
        }
    }

    fn post(&self, event: WorkerEvent) -> Result<(), TransportError> {
        self.tx.send(event).map_err(|_| TransportError::WorkerGone)
    }

    /// Connects to the signaling server at `url` and joins the room once
    /// connected. Progress is reported as [`RoomEvent`]s.
    pub fn join_room(&self, url: impl Into<String>) -> Result<(), TransportError> {
        self.post(WorkerEvent::Join { url: url.into() })
    }

    /// Leaves the room and releases every peer session. Returns once the
    /// worker has finished.
    pub async fn leave(mut self) -> Result<(), TransportError> {
        let (done, closed) = oneshot::channel();
        self.post(WorkerEvent::Close { done })?;
        closed.await.map_err(|_| TransportError::WorkerGone)?;
        match self.worker.take() {
            Some(worker) => worker.await.map_err(|_| TransportError::WorkerGone),
            None => Ok(()),
        }
    }

    pub async fn peer_state(&self, peer_id: &str) -> Result<Option<NegotiationState>, TransportError> {
        let (reply, answer) = oneshot::channel();
        self.post(WorkerEvent::Inspect(Inspect::State {
            peer_id: peer_id.to_owned(),
            reply,
        }))?;
        answer.await.map_err(|_| TransportError::WorkerGone)
    }

    pub async fn peer_role(&self, peer_id: &str) -> Result<Option<Role>, TransportError> {
        let (reply, answer) = oneshot::channel();
        self.post(WorkerEvent::Inspect(Inspect::Role {
            peer_id: peer_id.to_owned(),
            reply,
        }))?;
        answer.await.map_err(|_| TransportError::WorkerGone)
    }

    pub async fn peer_count(&self) -> Result<usize, TransportError> {
        let (reply, answer) = oneshot::channel();
        self.post(WorkerEvent::Inspect(Inspect::Count { reply }))?;
        answer.await.map_err(|_| TransportError::WorkerGone)
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        debug!("RoomClient for {} dropped, closing room", self.room);
        let (done, _) = oneshot::channel();
        let _ = self.tx.send(WorkerEvent::Close { done });
    }
}

async fn run(mut orchestrator: SessionOrchestrator, mut rx: mpsc::UnboundedReceiver<WorkerEvent>) {
    info!("Room worker for {} started", orchestrator.room());
    while let Some(event) = rx.recv().await {
        match event {
            WorkerEvent::Join { url } => orchestrator.connect(&url).await,
            WorkerEvent::Signaling(event) => orchestrator.on_signaling(event).await,
            WorkerEvent::Completed(completion) => {
                orchestrator.on_native_completion(completion).await
            }
            WorkerEvent::LocalCandidate {
                peer_id,
                epoch,
                candidate,
            } => {
                orchestrator
                    .on_local_candidate(&peer_id, epoch, candidate)
                    .await
            }
            WorkerEvent::RemoteTrack {
                peer_id,
                epoch,
                track,
            } => orchestrator.on_remote_track(&peer_id, epoch, track),
            WorkerEvent::Inspect(query) => orchestrator.answer(query),
            WorkerEvent::Close { done } => {
                orchestrator.close().await;
                let _ = done.send(());
                break;
            }
        }
    }
    debug!("Room worker for {} stopped", orchestrator.room());
}
