use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

use vehicle_dynamics::dynamics::ControllerOutput;
use vehicle_dynamics::mpcc::{ControlCommand, HorizonPoint, SessionState};
use vehicle_dynamics::vehicle::VehicleKinematicState;

/// Latest manual driver input, all axes nominally in [0, 1] / [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverInput {
    #[serde(default)]
    pub throttle: f64,
    #[serde(default)]
    pub brake: f64,
    #[serde(default)]
    pub steer: f64, // -1 (full right) .. 1 (full left)
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackTelemetry {
    pub id: String,
    pub s: f64,
    pub lap_fraction: f64,
    pub lateral_error: f64,
    pub laps: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutopilotTelemetry {
    pub session: SessionState,
    pub control: ControlCommand,
    pub cost: Option<f64>,
    pub solver_status: Option<String>,
    pub horizon: Vec<HorizonPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "snapshot")]
pub struct Snapshot {
    pub tick: u64,
    pub time: f64,
    pub vehicle: VehicleKinematicState,
    pub telemetry: ControllerOutput,
    pub track: TrackTelemetry,
    pub autopilot: Option<AutopilotTelemetry>,
}

pub struct SharedSimState {
    pub tick: u64,
    pub clients: HashMap<String, UnboundedSender<String>>,
    pub input: Option<DriverInput>,
}

impl SharedSimState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            clients: HashMap::new(),
            input: None,
        }
    }

    pub fn register_client(&mut self, id: &str, tx: UnboundedSender<String>) {
        self.clients.insert(id.to_string(), tx);
    }

    /// Drop a client. Manual input is cleared once nobody is connected.
    pub fn remove_client(&mut self, id: &str) {
        self.clients.remove(id);
        if self.clients.is_empty() {
            self.input = None;
        }
    }

    pub fn update_input(&mut self, input: DriverInput) {
        self.input = Some(input);
    }

    /// Serialize once and fan out to every client; closed channels are pruned.
    pub fn broadcast_snapshot(&mut self, snapshot: &Snapshot) -> serde_json::Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.clients.retain(|_, tx| tx.send(json.clone()).is_ok());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn snapshot() -> Snapshot {
        Snapshot {
            tick: 7,
            time: 0.5,
            vehicle: VehicleKinematicState::default(),
            telemetry: ControllerOutput::default(),
            track: TrackTelemetry { id: "oval".into(), s: 1.0, lap_fraction: 0.01, lateral_error: 0.0, laps: 0 },
            autopilot: None,
        }
    }

    #[test]
    fn snapshot_is_tagged() {
        let value = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["tick"], 7);
        assert_eq!(value["track"]["id"], "oval");
        assert!(value["autopilot"].is_null());
    }

    #[test]
    fn broadcast_prunes_closed_clients() {
        let mut state = SharedSimState::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        state.register_client("a", tx_a);
        state.register_client("b", tx_b);
        drop(rx_b);

        state.broadcast_snapshot(&snapshot()).unwrap();
        assert!(rx_a.try_recv().unwrap().contains("\"snapshot\""));
        assert_eq!(state.clients.len(), 1);
    }

    #[test]
    fn input_defaults_missing_axes() {
        let input: DriverInput = serde_json::from_str(r#"{"throttle":0.5}"#).unwrap();
        assert_eq!(input, DriverInput { throttle: 0.5, brake: 0.0, steer: 0.0 });
    }

    #[test]
    fn last_client_leaving_clears_input() {
        let mut state = SharedSimState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        state.register_client("a", tx);
        state.update_input(DriverInput { throttle: 1.0, ..Default::default() });
        state.remove_client("a");
        assert!(state.input.is_none());
    }
}
