// ==============================================================================
// worker.rs — SOLVER EXECUTION CONTEXT
// ==============================================================================
// Dedicated OS thread ("mpcc-worker"). Blocks on the single-slot request
// channel, runs the solver, answers on the response channel. Exits when the
// client drops its request sender or the response receiver is gone.
//
// A failed init keeps whatever model was loaded before.
// ==============================================================================

use std::io;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mpcc::protocol::{WorkerRequest, WorkerResponse};
use crate::mpcc::solver::MpccSolver;

pub(crate) fn spawn_worker<S: MpccSolver>(
    requests: mpsc::Receiver<WorkerRequest>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("mpcc-worker".into())
        .spawn(move || run::<S>(requests, responses))
}

fn run<S: MpccSolver>(mut requests: mpsc::Receiver<WorkerRequest>, responses: mpsc::UnboundedSender<WorkerResponse>) {
    info!("mpcc worker started");
    let mut solver: Option<S> = None;

    while let Some(request) = requests.blocking_recv() {
        let kind = request.kind();
        debug!(%kind, "worker handling request");

        let response = handle(&mut solver, request);
        if let WorkerResponse::Error { message } = &response {
            warn!(%kind, %message, "worker request failed");
        }

        if responses.send(response).is_err() {
            break;
        }
    }

    info!("mpcc worker stopped");
}

fn handle<S: MpccSolver>(solver: &mut Option<S>, request: WorkerRequest) -> WorkerResponse {
    match request {
        WorkerRequest::Init { config, track } => match S::init(config, track) {
            Ok(loaded) => {
                *solver = Some(loaded);
                WorkerResponse::Ready
            }
            Err(err) => WorkerResponse::Error { message: format!("{err:#}") },
        },

        WorkerRequest::Step { state, timestamp } => match solver.as_mut() {
            Some(s) => match s.solve(&state, timestamp) {
                Ok(result) => WorkerResponse::StepResult(result),
                Err(err) => WorkerResponse::Error { message: format!("{err:#}") },
            },
            None => WorkerResponse::Error { message: "no model loaded".into() },
        },

        WorkerRequest::Reset => match solver.as_mut() {
            Some(s) => {
                s.reset();
                WorkerResponse::ResetDone
            }
            None => WorkerResponse::Error { message: "no model loaded".into() },
        },
    }
}
