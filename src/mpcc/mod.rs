//! mpcc - predictive contouring controller session: host-side client, worker
//! thread, wire protocol and the pluggable solver behind it.

pub mod config;
pub mod protocol;
pub mod solver;
mod worker;
pub mod client;

pub use client::{MpccClient, Reply, SessionState};
pub use config::{AccelBounds, Bounds, MpccConfig, Weights};
pub use protocol::{ControlCommand, HorizonPoint, RequestKind, StepResult, WorkerRequest, WorkerResponse};
pub use solver::{ContouringSolver, MpccSolver};
