// ==============================================================================
// config.rs — MPCC SESSION CONFIG
// ==============================================================================
// Immutable for the lifetime of a session; a new init replaces it wholesale.
// Wire shape:
//   { horizon_steps, dt,
//     weights: { progress, lateral, heading, curvature, input, rate, slack },
//     bounds:  { steering_rate, acceleration: { min, max }, steering?: { min, max }, slack },
//     vehicle?: { wheelbase, rear_axle_offset? },
//     warm_start }
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ensure_finite, ensure_non_negative, ensure_ordered, ensure_positive};
use crate::vehicle::{COMPACT_EV_GEOMETRY, SteeringBounds, VehicleGeometry};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub progress: f64,
    pub lateral: f64,
    pub heading: f64,
    pub curvature: f64,
    pub input: f64,
    pub rate: f64,
    pub slack: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelBounds {
    pub min: f64, // m/s^2
    pub max: f64, // m/s^2
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub steering_rate: f64, // rad/s, symmetric
    pub acceleration: AccelBounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steering: Option<SteeringBounds>,
    pub slack: f64, // m beyond the half width
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpccConfig {
    pub horizon_steps: usize,
    pub dt: f64,
    pub weights: Weights,
    pub bounds: Bounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleGeometry>,
    pub warm_start: bool,
}

impl Default for MpccConfig {
    fn default() -> Self {
        Self {
            horizon_steps: 20,
            dt: 0.1,
            weights: Weights {
                progress: 1.0,
                lateral: 2.0,
                heading: 1.0,
                curvature: 0.5,
                input: 0.01,
                rate: 0.1,
                slack: 100.0,
            },
            bounds: Bounds {
                steering_rate: 0.8,
                acceleration: AccelBounds { min: -6.0, max: 3.0 },
                steering: Some(SteeringBounds { min: -0.6, max: 0.6 }),
                slack: 0.5,
            },
            vehicle: Some(COMPACT_EV_GEOMETRY),
            warm_start: true,
        }
    }
}

impl MpccConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon_steps == 0 {
            return Err(ConfigError::invalid("horizon_steps must be >= 1"));
        }
        ensure_positive("dt", self.dt)?;

        let w = &self.weights;
        for (field, value) in [
            ("weights.progress", w.progress),
            ("weights.lateral", w.lateral),
            ("weights.heading", w.heading),
            ("weights.curvature", w.curvature),
            ("weights.input", w.input),
            ("weights.rate", w.rate),
            ("weights.slack", w.slack),
        ] {
            ensure_finite(field, value)?;
        }

        let b = &self.bounds;
        ensure_non_negative("bounds.steering_rate", b.steering_rate)?;
        ensure_ordered(
            "bounds.acceleration.min",
            b.acceleration.min,
            "bounds.acceleration.max",
            b.acceleration.max,
        )?;
        if let Some(s) = b.steering {
            ensure_ordered("bounds.steering.min", s.min, "bounds.steering.max", s.max)?;
        }
        ensure_non_negative("bounds.slack", b.slack)?;

        self.geometry().validate()
    }

    /// Vehicle geometry used by the prediction model.
    pub fn geometry(&self) -> VehicleGeometry {
        self.vehicle.unwrap_or(COMPACT_EV_GEOMETRY)
    }
}
