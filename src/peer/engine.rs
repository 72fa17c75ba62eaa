use crate::error::{EngineError, NativeOpKind};
use crate::peer::types::{IceCandidate, RemoteTrack, SessionDescription};
use crate::session::WorkerEvent;
use async_trait::async_trait;
use log::debug;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// One native peer connection. Owned by exactly one peer session.
#[async_trait]
pub trait NativePeer: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;
    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;
    async fn close(&self) -> Result<(), EngineError>;
}

/// Factory for native peer connections.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Creates the peer connection for `peer_id`. Gathered candidates and
    /// remote tracks must be reported through `observer`.
    async fn create_peer_connection(
        &self,
        peer_id: &str,
        observer: PeerObserver,
    ) -> Result<Arc<dyn NativePeer>, EngineError>;
}

/// Native-side notifications for one peer session, marshalled onto the
/// room worker queue.
#[derive(Clone)]
pub struct PeerObserver {
    peer_id: String,
    epoch: u64,
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl PeerObserver {
    pub(crate) fn new(peer_id: String, epoch: u64, tx: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self { peer_id, epoch, tx }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// A locally gathered candidate that must reach the remote peer.
    pub fn on_ice_candidate(&self, candidate: IceCandidate) {
        let event = WorkerEvent::LocalCandidate {
            peer_id: self.peer_id.clone(),
            epoch: self.epoch,
            candidate,
        };
        if self.tx.send(event).is_err() {
            debug!("Room worker gone, dropping local candidate for {}", self.peer_id);
        }
    }

    pub fn on_remote_track(&self, track: RemoteTrack) {
        let event = WorkerEvent::RemoteTrack {
            peer_id: self.peer_id.clone(),
            epoch: self.epoch,
            track,
        };
        if self.tx.send(event).is_err() {
            debug!("Room worker gone, dropping remote track for {}", self.peer_id);
        }
    }
}

impl fmt::Debug for PeerObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerObserver")
            .field("peer_id", &self.peer_id)
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// The native peer of one session, shared with that session's running
/// jobs. Operations and release take turns; once released, nothing
/// reaches the native peer again.
pub struct PeerHandle {
    native: Arc<dyn NativePeer>,
    released: Mutex<bool>,
}

impl PeerHandle {
    pub fn new(native: Arc<dyn NativePeer>) -> Arc<Self> {
        Arc::new(Self {
            native,
            released: Mutex::new(false),
        })
    }

    async fn run(&self, op: NativeOp) -> Result<NativeOutput, EngineError> {
        let released = self.released.lock().await;
        if *released {
            return Err(EngineError("peer connection already released".into()));
        }
        let native = &self.native;
        match op {
            NativeOp::CreateOffer => native.create_offer().await.map(NativeOutput::Description),
            NativeOp::CreateAnswer => native.create_answer().await.map(NativeOutput::Description),
            NativeOp::SetLocal(desc) => native
                .set_local_description(desc)
                .await
                .map(|_| NativeOutput::Done),
            NativeOp::SetRemote(desc) => native
                .set_remote_description(desc)
                .await
                .map(|_| NativeOutput::Done),
            NativeOp::AddCandidate(candidate) => native
                .add_ice_candidate(candidate)
                .await
                .map(|_| NativeOutput::Done),
        }
    }

    /// Waits for the running operation, if any, then closes the native
    /// peer. Later calls are no-ops.
    pub async fn release(&self) -> Result<(), EngineError> {
        let mut released = self.released.lock().await;
        if *released {
            return Ok(());
        }
        *released = true;
        self.native.close().await
    }
}

/// A native operation waiting for its turn on a peer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeOp {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(IceCandidate),
}

impl NativeOp {
    pub fn kind(&self) -> NativeOpKind {
        match self {
            NativeOp::CreateOffer => NativeOpKind::CreateOffer,
            NativeOp::CreateAnswer => NativeOpKind::CreateAnswer,
            NativeOp::SetLocal(_) => NativeOpKind::SetLocalDescription,
            NativeOp::SetRemote(_) => NativeOpKind::SetRemoteDescription,
            NativeOp::AddCandidate(_) => NativeOpKind::AddIceCandidate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeOutput {
    Description(SessionDescription),
    Done,
}

type NativeFuture = Pin<Box<dyn Future<Output = Result<NativeOutput, EngineError>> + Send>>;

/// A started native operation. Running it yields the completion that has
/// to be fed back to the owning session.
pub struct NativeJob {
    peer_id: String,
    epoch: u64,
    ticket: u64,
    op: NativeOp,
    future: NativeFuture,
}

impl NativeJob {
    pub(crate) fn new(
        peer_id: String,
        epoch: u64,
        ticket: u64,
        handle: Arc<PeerHandle>,
        op: NativeOp,
    ) -> Self {
        let queued = op.clone();
        let future: NativeFuture = Box::pin(async move { handle.run(queued).await });
        Self {
            peer_id,
            epoch,
            ticket,
            op,
            future,
        }
    }

    pub fn kind(&self) -> NativeOpKind {
        self.op.kind()
    }

    pub fn op(&self) -> &NativeOp {
        &self.op
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub async fn run(self) -> NativeCompletion {
        let result = self.future.await;
        NativeCompletion {
            peer_id: self.peer_id,
            epoch: self.epoch,
            ticket: self.ticket,
            result,
        }
    }
}

impl fmt::Debug for NativeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeJob")
            .field("peer_id", &self.peer_id)
            .field("epoch", &self.epoch)
            .field("ticket", &self.ticket)
            .field("op", &self.op.kind())
            .finish()
    }
}

/// Result of a native operation, tagged with the session it belongs to.
#[derive(Debug)]
pub struct NativeCompletion {
    pub peer_id: String,
    pub epoch: u64,
    pub ticket: u64,
    pub result: Result<NativeOutput, EngineError>,
}
