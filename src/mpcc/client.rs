// ==============================================================================
// client.rs — MPCC SESSION (HOST SIDE)
// ==============================================================================
// Session state machine:
//
//   Uninitialized --init ok--> Ready --step/reset/init--> Busy --reply--> Ready
//          |                                               |
//          +-----------------init--------------------------+ (error reply:
//                                                            back to prior)
//
// Exactly one request may be outstanding. A second call while the slot is
// occupied is rejected immediately with ProtocolError::Busy; the outstanding
// request is left untouched and resolves on its own.
//
// Each call returns a Reply<T> right away; awaiting it yields the result once
// the router task has matched the worker's response to the pending slot.
// ==============================================================================

use std::future::IntoFuture;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::mpcc::config::MpccConfig;
use crate::mpcc::protocol::{RequestKind, StepResult, WorkerRequest, WorkerResponse};
use crate::mpcc::solver::{ContouringSolver, MpccSolver};
use crate::mpcc::worker::spawn_worker;
use crate::track::TrackMap;
use crate::vehicle::VehicleKinematicState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Ready,
    Busy,
    /// Shut down or worker gone; every request fails with `Disconnected`.
    Closed,
}

type ReplySender = oneshot::Sender<Result<WorkerResponse, ProtocolError>>;

struct PendingRequest {
    kind: RequestKind,
    prior: SessionState,
    reply: ReplySender,
}

struct Session {
    state: SessionState,
    pending: Option<PendingRequest>,
}

impl Session {
    // fail whatever is outstanding; the session is unusable afterwards
    fn close(&mut self) {
        self.state = SessionState::Closed;
        if let Some(p) = self.pending.take() {
            let _ = p.reply.send(Err(ProtocolError::Disconnected));
        }
    }
}

/// Result of an accepted request. Await it to get the worker's answer.
pub struct Reply<T> {
    rx: oneshot::Receiver<Result<WorkerResponse, ProtocolError>>,
    map: fn(WorkerResponse) -> Result<T, ProtocolError>,
}

impl<T: Send + 'static> IntoFuture for Reply<T> {
    type Output = Result<T, ProtocolError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let response = self.rx.await.map_err(|_| ProtocolError::Disconnected)??;
            (self.map)(response)
        })
    }
}

fn unexpected(kind: RequestKind, response: &WorkerResponse) -> ProtocolError {
    ProtocolError::WorkerFailure(format!("unexpected response to {kind}: {response:?}"))
}

fn expect_ready(response: WorkerResponse) -> Result<(), ProtocolError> {
    match response {
        WorkerResponse::Ready => Ok(()),
        other => Err(unexpected(RequestKind::Init, &other)),
    }
}

fn expect_step(response: WorkerResponse) -> Result<StepResult, ProtocolError> {
    match response {
        WorkerResponse::StepResult(result) => Ok(result),
        other => Err(unexpected(RequestKind::Step, &other)),
    }
}

fn expect_reset(response: WorkerResponse) -> Result<(), ProtocolError> {
    match response {
        WorkerResponse::ResetDone => Ok(()),
        other => Err(unexpected(RequestKind::Reset, &other)),
    }
}

pub struct MpccClient {
    session: Arc<Mutex<Session>>,
    requests: Option<mpsc::Sender<WorkerRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl MpccClient {
    /// Start a session backed by the default [`ContouringSolver`].
    /// Must be called from inside a tokio runtime.
    pub fn spawn() -> io::Result<Self> {
        Self::spawn_with::<ContouringSolver>()
    }

    pub fn spawn_with<S: MpccSolver>() -> io::Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(io::Error::other)?;

        let (req_tx, req_rx) = mpsc::channel::<WorkerRequest>(1);
        let (resp_tx, resp_rx) = mpsc::unbounded_channel::<WorkerResponse>();

        let session = Arc::new(Mutex::new(Session {
            state: SessionState::Uninitialized,
            pending: None,
        }));

        let worker = spawn_worker::<S>(req_rx, resp_tx)?;
        runtime.spawn(route_responses(Arc::clone(&session), resp_rx));

        Ok(Self { session, requests: Some(req_tx), worker: Some(worker) })
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().state
    }

    /// Load (or replace) config and track. Allowed in any non-busy state.
    pub fn init(&self, config: MpccConfig, track: TrackMap) -> Result<Reply<()>, ProtocolError> {
        let rx = self.issue(WorkerRequest::Init { config, track })?;
        Ok(Reply { rx, map: expect_ready })
    }

    pub fn step(&self, state: VehicleKinematicState, timestamp: f64) -> Result<Reply<StepResult>, ProtocolError> {
        let rx = self.issue(WorkerRequest::Step { state, timestamp })?;
        Ok(Reply { rx, map: expect_step })
    }

    /// Clear solver warm-start data, keeping config and track.
    pub fn reset(&self) -> Result<Reply<()>, ProtocolError> {
        let rx = self.issue(WorkerRequest::Reset)?;
        Ok(Reply { rx, map: expect_reset })
    }

    /// Stop the worker and fail any pending request with `Disconnected`.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(worker) = self.worker.take() {
            if tokio::task::spawn_blocking(move || worker.join()).await.is_err() {
                warn!("mpcc worker join failed");
            }
        }
    }

    fn close(&mut self) {
        self.requests = None;
        self.session.lock().close();
    }

    fn issue(&self, request: WorkerRequest) -> Result<oneshot::Receiver<Result<WorkerResponse, ProtocolError>>, ProtocolError> {
        let kind = request.kind();
        let mut session = self.session.lock();

        if session.state == SessionState::Closed {
            return Err(ProtocolError::Disconnected);
        }
        if let Some(pending) = &session.pending {
            return Err(ProtocolError::Busy { pending: pending.kind });
        }
        if kind != RequestKind::Init && session.state == SessionState::Uninitialized {
            return Err(ProtocolError::NotInitialized);
        }

        let requests = self.requests.as_ref().ok_or(ProtocolError::Disconnected)?;
        requests.try_send(request).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => ProtocolError::Busy { pending: kind },
            mpsc::error::TrySendError::Closed(_) => ProtocolError::Disconnected,
        })?;

        let (tx, rx) = oneshot::channel();
        let prior = session.state;
        session.pending = Some(PendingRequest { kind, prior, reply: tx });
        session.state = SessionState::Busy;
        debug!(%kind, "mpcc request issued");

        Ok(rx)
    }
}

impl Drop for MpccClient {
    fn drop(&mut self) {
        self.close();
    }
}

async fn route_responses(session: Arc<Mutex<Session>>, mut responses: mpsc::UnboundedReceiver<WorkerResponse>) {
    while let Some(response) = responses.recv().await {
        let mut session = session.lock();
        let Some(pending) = session.pending.take() else {
            warn!(?response, "dropping worker response with no pending request");
            continue;
        };

        let result = match response {
            WorkerResponse::Error { message } => {
                session.state = pending.prior;
                warn!(kind = %pending.kind, %message, "mpcc request rejected by worker");
                Err(ProtocolError::WorkerFailure(message))
            }
            other => {
                session.state = SessionState::Ready;
                debug!(kind = %pending.kind, "mpcc request completed");
                Ok(other)
            }
        };

        // caller may have dropped the Reply
        let _ = pending.reply.send(result);
    }

    session.lock().close();
}
