// ==============================================================================
// sim.rs — HOST SIMULATION TICK
// ==============================================================================
// One tick:
//   1) pick up a finished autopilot reply (never blocks), issue the next step
//      if the session is idle
//   2) intent from the autopilot command, or from the latest driver input
//   3) vehicle step (longitudinal controller + kinematic bicycle)
//   4) track bookkeeping: projection, lap counter, off-track recovery
// ==============================================================================

use std::future::IntoFuture;

use futures::FutureExt;
use futures::future::BoxFuture;
use nalgebra::Point2;
use tracing::{debug, info, warn};

use vehicle_dynamics::dynamics::DriverIntent;
use vehicle_dynamics::error::{ConfigError, ProtocolError};
use vehicle_dynamics::mpcc::{ControlCommand, MpccClient, SessionState, StepResult};
use vehicle_dynamics::track::{TrackMap, make_loop, offset_loop};
use vehicle_dynamics::vehicle::{Vehicle, pedal_intent_for};

use crate::state::{AutopilotTelemetry, DriverInput, Snapshot, TrackTelemetry};

// vehicle is put back on the start line beyond this distance outside the edge
const RECOVERY_MARGIN: f64 = 5.0; // m

const DEMO_HALF_WIDTH: f64 = 5.0; // m

/// Stadium-shaped loop: two 120 m straights joined by 40 m radius turns.
pub fn demo_track(start_offset: isize) -> Result<TrackMap, ConfigError> {
    let straight = 120.0;
    let radius = 40.0;
    let mut points = Vec::new();

    for i in 0..24 {
        points.push(Point2::new(-0.5 * straight + straight * i as f64 / 24.0, -radius));
    }
    for i in 0..36 {
        let theta = -std::f64::consts::FRAC_PI_2 + std::f64::consts::PI * i as f64 / 36.0;
        points.push(Point2::new(0.5 * straight + radius * theta.cos(), radius * theta.sin()));
    }
    for i in 0..24 {
        points.push(Point2::new(0.5 * straight - straight * i as f64 / 24.0, radius));
    }
    for i in 0..36 {
        let theta = std::f64::consts::FRAC_PI_2 + std::f64::consts::PI * i as f64 / 36.0;
        points.push(Point2::new(-0.5 * straight + radius * theta.cos(), radius * theta.sin()));
    }

    let rotated = offset_loop(&points, start_offset);
    let path = make_loop(&rotated[..rotated.len() - 1]);
    debug!(length = path.total_length, points = path.points.len(), "demo track built");

    TrackMap::from_centerline("stadium", &path.points, DEMO_HALF_WIDTH, true)
}

// Ok(Some) for a step reply, Ok(None) for a reset acknowledgement
type PendingReply = BoxFuture<'static, Result<Option<StepResult>, ProtocolError>>;

struct Autopilot {
    client: MpccClient,
    pending: Option<PendingReply>,
    last: Option<StepResult>,
    reset_requested: bool,
}

pub struct Simulation {
    pub vehicle: Vehicle,
    pub track: TrackMap,
    autopilot: Option<Autopilot>,
    time: f64,
    last_s: f64,
    laps: u64,
}

impl Simulation {
    pub fn new(vehicle: Vehicle, track: TrackMap, autopilot: Option<MpccClient>) -> Self {
        let mut sim = Self {
            vehicle,
            track,
            autopilot: autopilot.map(|client| Autopilot { client, pending: None, last: None, reset_requested: false }),
            time: 0.0,
            last_s: 0.0,
            laps: 0,
        };
        sim.place_on_start();
        sim
    }

    fn place_on_start(&mut self) {
        let start = self.track.sample_at(0.0);
        let heading = start.tangent.y.atan2(start.tangent.x);
        self.vehicle.place(start.center.x, start.center.y, heading);
        self.last_s = 0.0;
    }

    fn poll_autopilot(&mut self) -> Option<ControlCommand> {
        let ap = self.autopilot.as_mut()?;

        let finished = ap.pending.as_mut().and_then(|fut| fut.now_or_never());
        if let Some(result) = finished {
            ap.pending = None;
            match result {
                Ok(Some(step)) => ap.last = Some(step),
                Ok(None) => debug!("autopilot warm start cleared"),
                Err(err) => warn!(%err, "autopilot request failed"),
            }
        }

        if ap.pending.is_none() && ap.client.state() == SessionState::Ready {
            let issued = if ap.reset_requested {
                ap.client.reset().map(|reply| reply.into_future().map(|r| r.map(|()| None)).boxed())
            } else {
                ap.client
                    .step(self.vehicle.state, self.time)
                    .map(|reply| reply.into_future().map(|r| r.map(Some)).boxed())
            };
            match issued {
                Ok(fut) => {
                    ap.pending = Some(fut);
                    ap.reset_requested = false;
                }
                Err(err) if err.is_misuse() => debug!(%err, "autopilot request skipped"),
                Err(err) => warn!(%err, "autopilot request not issued"),
            }
        }

        Some(ap.last.as_ref().map(|s| s.control).unwrap_or_default())
    }

    pub fn tick(&mut self, tick: u64, dt: f64, input: Option<DriverInput>) -> Snapshot {
        let (intent, steering_rate) = match self.poll_autopilot() {
            Some(cmd) => (pedal_intent_for(cmd.acceleration, self.vehicle.longitudinal.config()), cmd.steering_rate),
            None => {
                let input = input.unwrap_or_default();
                let intent = DriverIntent { throttle: input.throttle, brake: input.brake };
                (intent, self.vehicle.steering_rate_toward(input.steer, dt))
            }
        };

        let telemetry = *self.vehicle.step(intent, steering_rate, dt);
        self.time += dt;

        let state = self.vehicle.state;
        let proj = self.track.project(&Point2::new(state.x, state.y));

        // wrapped past the start line going forward
        if self.track.progress(self.last_s, proj.s) > 0.0 && proj.s < self.last_s {
            self.laps += 1;
            info!(laps = self.laps, time = self.time, "lap completed");
        }
        self.last_s = proj.s;

        if proj.lateral_error.abs() > proj.half_width + RECOVERY_MARGIN {
            warn!(lateral_error = proj.lateral_error, "vehicle left the track, recovering");
            self.recover();
        }

        Snapshot {
            tick,
            time: self.time,
            vehicle: state,
            telemetry,
            track: TrackTelemetry {
                id: self.track.id.clone(),
                s: proj.s,
                lap_fraction: proj.s / self.track.length,
                lateral_error: proj.lateral_error,
                laps: self.laps,
            },
            autopilot: self.autopilot.as_ref().map(|ap| AutopilotTelemetry {
                session: ap.client.state(),
                control: ap.last.as_ref().map(|s| s.control).unwrap_or_default(),
                cost: ap.last.as_ref().and_then(|s| s.cost),
                solver_status: ap.last.as_ref().and_then(|s| s.solver_status.clone()),
                horizon: ap.last.as_ref().map(|s| s.horizon.clone()).unwrap_or_default(),
            }),
        }
    }

    fn recover(&mut self) {
        self.place_on_start();
        if let Some(ap) = self.autopilot.as_mut() {
            ap.last = None;
            ap.reset_requested = true;
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(ap) = self.autopilot.take() {
            ap.client.shutdown().await;
        }
    }
}
