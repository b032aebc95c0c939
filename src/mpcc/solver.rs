// ==============================================================================
// solver.rs — PLUGGABLE MPCC SOLVER + SAMPLED CONTOURING REFERENCE
// ==============================================================================
// ContouringSolver evaluates a grid of constant (steering_rate, acceleration)
// inputs held over the whole horizon, rolls each one out with the kinematic
// bicycle and keeps the cheapest:
//
//   J = -w_progress * ds
//       + sum_k ( w_lat * e_k^2 + w_head * epsi_k^2 + w_curv * kappa_k^2
//               + w_in * |u|^2 + w_slack * sigma_k^2 )
//       + w_rate * |u - u_prev|^2
//
//   sigma_k = max(|e_k| - half_width, 0)
//
// A candidate whose worst sigma exceeds bounds.slack is infeasible. When every
// candidate is infeasible the cheapest one is still returned with
// solver_status = "slack_limit".
//
// With warm_start the grid shrinks around the previous command.
// ==============================================================================

use anyhow::{Result, bail};
use nalgebra::Point2;
use tracing::debug;

use crate::mpcc::config::MpccConfig;
use crate::mpcc::protocol::{ControlCommand, HorizonPoint, StepResult};
use crate::track::{TrackMap, wrap_angle};
use crate::vehicle::{VehicleGeometry, VehicleKinematicState, integrate_kinematic};

pub const STATUS_OK: &str = "ok";
pub const STATUS_SLACK_LIMIT: &str = "slack_limit";

// grid resolution per input axis (odd so the centre is sampled)
const RATE_SAMPLES: usize = 9;
const ACCEL_SAMPLES: usize = 7;

// fraction of the full bound span searched around the previous command
const WARM_START_SPAN: f64 = 0.25;

/// Solver living on the worker side of a session.
pub trait MpccSolver: Sized + Send + 'static {
    fn init(config: MpccConfig, track: TrackMap) -> Result<Self>;

    fn solve(&mut self, state: &VehicleKinematicState, timestamp: f64) -> Result<StepResult>;

    /// Drop warm-start data, keep config and track.
    fn reset(&mut self);
}

#[derive(Debug, Clone)]
pub struct ContouringSolver {
    config: MpccConfig,
    track: TrackMap,
    geometry: VehicleGeometry,
    previous: Option<ControlCommand>,
    last_timestamp: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Rollout {
    cost: f64,
    max_violation: f64,
}

fn axis(lo: f64, hi: f64, n: usize) -> impl Iterator<Item = f64> {
    (0..n).map(move |i| {
        if n == 1 || hi <= lo {
            0.5 * (lo + hi)
        } else {
            lo + (hi - lo) * i as f64 / (n - 1) as f64
        }
    })
}

impl ContouringSolver {
    pub fn config(&self) -> &MpccConfig {
        &self.config
    }

    pub fn track(&self) -> &TrackMap {
        &self.track
    }

    // (lo, hi) search window for one input axis
    fn window(&self, lo: f64, hi: f64, previous: Option<f64>) -> (f64, f64) {
        match (self.config.warm_start, previous) {
            (true, Some(centre)) => {
                let half = 0.5 * WARM_START_SPAN * (hi - lo);
                let centre = centre.clamp(lo, hi);
                ((centre - half).max(lo), (centre + half).min(hi))
            }
            _ => (lo, hi),
        }
    }

    fn step_model(&self, state: &VehicleKinematicState, u: ControlCommand) -> VehicleKinematicState {
        let mut next = integrate_kinematic(
            state,
            &self.geometry,
            u.steering_rate,
            u.acceleration,
            self.config.dt,
            self.config.bounds.steering,
        );
        next.v = next.v.max(0.0);
        next
    }

    fn evaluate(&self, state: &VehicleKinematicState, u: ControlCommand) -> Rollout {
        let w = &self.config.weights;
        let start = self.track.project(&Point2::new(state.x, state.y));

        let mut cost = 0.0;
        let mut max_violation: f64 = 0.0;
        let mut progress = 0.0;
        let mut last_s = start.s;
        let mut current = *state;

        for _ in 0..self.config.horizon_steps {
            current = self.step_model(&current, u);
            let proj = self.track.project(&Point2::new(current.x, current.y));

            progress += self.track.progress(last_s, proj.s);
            last_s = proj.s;

            let e = proj.lateral_error;
            let epsi = wrap_angle(current.psi - proj.heading);
            let kappa = current.delta.tan() / self.geometry.wheelbase;
            let sigma = (e.abs() - proj.half_width).max(0.0);
            max_violation = max_violation.max(sigma);

            cost += w.lateral * e * e
                + w.heading * epsi * epsi
                + w.curvature * kappa * kappa
                + w.input * (u.steering_rate * u.steering_rate + u.acceleration * u.acceleration)
                + w.slack * sigma * sigma;
        }

        let prev = self.previous.unwrap_or_default();
        let d_rate = u.steering_rate - prev.steering_rate;
        let d_accel = u.acceleration - prev.acceleration;
        cost += w.rate * (d_rate * d_rate + d_accel * d_accel);
        cost -= w.progress * progress;

        Rollout { cost, max_violation }
    }

    fn horizon(&self, state: &VehicleKinematicState, u: ControlCommand) -> Vec<HorizonPoint> {
        let mut current = *state;
        (0..self.config.horizon_steps)
            .map(|_| {
                current = self.step_model(&current, u);
                let proj = self.track.project(&Point2::new(current.x, current.y));
                HorizonPoint {
                    arc_length: proj.s,
                    position: Point2::new(current.x, current.y),
                    heading: current.psi,
                    curvature: proj.curvature,
                }
            })
            .collect()
    }
}

impl MpccSolver for ContouringSolver {
    fn init(config: MpccConfig, track: TrackMap) -> Result<Self> {
        config.validate()?;
        track.validate()?;
        let geometry = config.geometry();
        debug!(track = %track.id, horizon = config.horizon_steps, "contouring solver loaded");
        Ok(Self { config, track, geometry, previous: None, last_timestamp: None })
    }

    fn solve(&mut self, state: &VehicleKinematicState, timestamp: f64) -> Result<StepResult> {
        let finite = [state.x, state.y, state.psi, state.v, state.delta].iter().all(|v| v.is_finite());
        if !finite {
            bail!("vehicle state must be finite");
        }
        if !timestamp.is_finite() {
            bail!("timestamp must be finite (got {timestamp})");
        }

        // time went backwards: new episode, warm start is stale
        if self.last_timestamp.is_some_and(|t| timestamp < t) {
            self.previous = None;
        }
        self.last_timestamp = Some(timestamp);

        let b = &self.config.bounds;
        let rate = self.window(-b.steering_rate, b.steering_rate, self.previous.map(|p| p.steering_rate));
        let accel = self.window(b.acceleration.min, b.acceleration.max, self.previous.map(|p| p.acceleration));

        let mut best_feasible: Option<(ControlCommand, Rollout)> = None;
        let mut best_any: Option<(ControlCommand, Rollout)> = None;

        for steering_rate in axis(rate.0, rate.1, RATE_SAMPLES) {
            for acceleration in axis(accel.0, accel.1, ACCEL_SAMPLES) {
                let u = ControlCommand { steering_rate, acceleration };
                let r = self.evaluate(state, u);

                if best_any.is_none_or(|(_, b)| r.cost < b.cost) {
                    best_any = Some((u, r));
                }
                if r.max_violation <= self.config.bounds.slack
                    && best_feasible.is_none_or(|(_, b)| r.cost < b.cost)
                {
                    best_feasible = Some((u, r));
                }
            }
        }

        let (control, rollout, status) = match (best_feasible, best_any) {
            (Some((u, r)), _) => (u, r, STATUS_OK),
            (None, Some((u, r))) => (u, r, STATUS_SLACK_LIMIT),
            (None, None) => bail!("empty candidate set"),
        };

        self.previous = Some(control);

        Ok(StepResult {
            control,
            horizon: self.horizon(state, control),
            cost: Some(rollout.cost),
            solver_status: Some(status.to_string()),
        })
    }

    fn reset(&mut self) {
        self.previous = None;
        self.last_timestamp = None;
    }
}
