// ==============================================================================
// protocol.rs — CLIENT <-> WORKER MESSAGES
// ==============================================================================
// client -> worker   { "type": "init", config, track }
//                    { "type": "step", state, timestamp }
//                    { "type": "reset" }
// worker -> client   { "type": "ready" }
//                    { "type": "step_result", control, horizon, cost?, solver_status? }
//                    { "type": "reset_done" }
//                    { "type": "error", message }
//
// Payloads move by value across the boundary; neither side sees the other's
// later mutations.
// ==============================================================================

use std::fmt;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::mpcc::config::MpccConfig;
use crate::track::TrackMap;
use crate::vehicle::VehicleKinematicState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Init,
    Step,
    Reset,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Init => "init",
            RequestKind::Step => "step",
            RequestKind::Reset => "reset",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Init { config: MpccConfig, track: TrackMap },
    Step { state: VehicleKinematicState, timestamp: f64 },
    Reset,
}

impl WorkerRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            WorkerRequest::Init { .. } => RequestKind::Init,
            WorkerRequest::Step { .. } => RequestKind::Step,
            WorkerRequest::Reset => RequestKind::Reset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlCommand {
    pub steering_rate: f64, // rad/s
    pub acceleration: f64,  // m/s^2
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonPoint {
    pub arc_length: f64,
    pub position: Point2<f64>,
    pub heading: f64,
    pub curvature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub control: ControlCommand,
    pub horizon: Vec<HorizonPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    Ready,
    StepResult(StepResult),
    ResetDone,
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_kind_display_matches_wire_tag() {
        for (req, tag) in [
            (WorkerRequest::Reset, "reset"),
            (WorkerRequest::Step { state: VehicleKinematicState::default(), timestamp: 0.0 }, "step"),
        ] {
            let value = serde_json::to_value(&req).unwrap();
            assert_eq!(value["type"], tag);
            assert_eq!(req.kind().to_string(), tag);
        }
    }

    #[test]
    fn step_request_wire_shape() {
        let req = WorkerRequest::Step {
            state: VehicleKinematicState { x: 1.0, y: 2.0, psi: 0.5, v: 3.0, delta: -0.1 },
            timestamp: 12.5,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "type": "step",
                "state": { "x": 1.0, "y": 2.0, "psi": 0.5, "v": 3.0, "delta": -0.1 },
                "timestamp": 12.5
            })
        );
    }

    #[test]
    fn step_result_fields_are_flattened_under_the_tag() {
        let resp = WorkerResponse::StepResult(StepResult {
            control: ControlCommand { steering_rate: 0.1, acceleration: -1.0 },
            horizon: vec![HorizonPoint {
                arc_length: 4.0,
                position: Point2::new(4.0, 0.5),
                heading: 0.0,
                curvature: 0.01,
            }],
            cost: None,
            solver_status: Some("ok".into()),
        });

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["type"], "step_result");
        assert_eq!(value["control"]["acceleration"], -1.0);
        assert_eq!(value["horizon"][0]["position"], json!([4.0, 0.5]));
        assert!(value.get("cost").is_none());
        assert_eq!(value["solver_status"], "ok");
    }

    #[test]
    fn error_and_unit_responses_parse() {
        let err: WorkerResponse = serde_json::from_value(json!({ "type": "error", "message": "boom" })).unwrap();
        assert_eq!(err, WorkerResponse::Error { message: "boom".into() });

        let done: WorkerResponse = serde_json::from_value(json!({ "type": "reset_done" })).unwrap();
        assert_eq!(done, WorkerResponse::ResetDone);
    }
}
