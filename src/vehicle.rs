// ==============================================================================
// vehicle.rs — KINEMATIC VEHICLE + PRESETS
// ==============================================================================
// Kinematic bicycle about a reference point `lr` ahead of the rear axle:
//
//   beta  = atan(lr / L * tan(delta))
//   x'    = v * cos(psi + beta)
//   y'    = v * sin(psi + beta)
//   psi'  = v * cos(beta) * tan(delta) / L
//   delta'= steering_rate
//   v'    = acceleration
//
// Explicit Euler, one call per host tick. The MPCC rollout uses the same
// integrator so prediction and plant agree.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::dynamics::aero::AeroConfig;
use crate::dynamics::brake_blend::BrakeBlendConfig;
use crate::dynamics::final_accel::{ControllerOutput, DriverIntent, FinalAccelConfig, FinalAccelController};
use crate::dynamics::powertrain::PowertrainConfig;
use crate::dynamics::rolling::RollingResistanceConfig;
use crate::error::{ConfigError, ensure_ordered, ensure_positive};

/// Planar pose + speed + steering angle, produced by the host every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleKinematicState {
    pub x: f64,     // m
    pub y: f64,     // m
    pub psi: f64,   // rad
    pub v: f64,     // m/s
    pub delta: f64, // rad
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleGeometry {
    pub wheelbase: f64, // m
    /// Distance from the rear axle to the reference point. Half the wheelbase
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rear_axle_offset: Option<f64>,
}

impl VehicleGeometry {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("vehicle.wheelbase", self.wheelbase)?;
        if let Some(lr) = self.rear_axle_offset {
            ensure_ordered("0", 0.0, "vehicle.rear_axle_offset", lr)?;
            ensure_ordered("vehicle.rear_axle_offset", lr, "vehicle.wheelbase", self.wheelbase)?;
        }
        Ok(())
    }

    pub fn lr(&self) -> f64 {
        self.rear_axle_offset.unwrap_or(0.5 * self.wheelbase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SteeringBounds {
    pub min: f64, // rad
    pub max: f64, // rad
}

/// Advance the kinematic bicycle by `dt`. `steering` saturates delta when set.
pub fn integrate_kinematic(
    state: &VehicleKinematicState,
    geometry: &VehicleGeometry,
    steering_rate: f64,
    acceleration: f64,
    dt: f64,
    steering: Option<SteeringBounds>,
) -> VehicleKinematicState {
    let l = geometry.wheelbase;
    let beta = (geometry.lr() / l * state.delta.tan()).atan();
    let heading = state.psi + beta;

    let mut delta = state.delta + steering_rate * dt;
    if let Some(b) = steering {
        delta = delta.clamp(b.min, b.max);
    }

    VehicleKinematicState {
        x: state.x + state.v * heading.cos() * dt,
        y: state.y + state.v * heading.sin() * dt,
        psi: state.psi + state.v * beta.cos() * state.delta.tan() / l * dt,
        v: state.v + acceleration * dt,
        delta,
    }
}

// ------------------------------------------------------------------
// presets
// ------------------------------------------------------------------

/// Compact hatchback EV, single rear motor, 50 kWh pack.
pub const COMPACT_EV: FinalAccelConfig = FinalAccelConfig {
    mass: 1_550.0,
    wheel_radius: 0.32,
    gravity: 9.81,
    tau_throttle: 0.15,
    tau_brake: 0.08,
    accel_min: -9.0,
    accel_max: 4.0,
    stop_speed_epsilon: 0.2,

    powertrain: PowertrainConfig {
        max_drive_torque: 2_400.0, // 310 N*m motor * 7.7 reduction
        max_regen_torque: 1_200.0,
        max_power: 110_000.0,
        max_regen_power: 60_000.0,
        drive_efficiency: 0.9,
        regen_efficiency: 0.7,
        battery_capacity_kwh: 50.0,
        min_soc: 0.05,
        max_soc: 0.95,
        initial_soc: 0.8,
        wheel_radius: 0.32,
    },

    aero: AeroConfig {
        drag_coefficient: 0.38, // 0.5 * 1.2 * Cd 0.29 * 2.2 m^2
        downforce_coefficient: 0.05,
    },

    rolling: RollingResistanceConfig {
        coefficient: 0.012,
        blend_speed: 0.5,
    },

    brake: BrakeBlendConfig {
        max_brake_force: 14_000.0,
        regen_fade_speed: 2.0,
    },
};

pub const COMPACT_EV_GEOMETRY: VehicleGeometry = VehicleGeometry {
    wheelbase: 2.6,
    rear_axle_offset: Some(1.3),
};

pub const COMPACT_EV_STEERING: SteeringBounds = SteeringBounds { min: -0.6, max: 0.6 };

pub const COMPACT_EV_MAX_STEER_RATE: f64 = 0.8; // rad/s

/// Map a requested acceleration to pedal positions using the controller's
/// acceleration envelope.
pub fn pedal_intent_for(acceleration: f64, config: &FinalAccelConfig) -> DriverIntent {
    if acceleration >= 0.0 {
        DriverIntent {
            throttle: (acceleration / config.accel_max).clamp(0.0, 1.0),
            brake: 0.0,
        }
    } else {
        DriverIntent {
            throttle: 0.0,
            brake: (acceleration / config.accel_min).clamp(0.0, 1.0),
        }
    }
}

// ------------------------------------------------------------------
// simulated vehicle
// ------------------------------------------------------------------

pub struct Vehicle {
    pub state: VehicleKinematicState,
    pub geometry: VehicleGeometry,
    pub steering: SteeringBounds,
    pub max_steer_rate: f64, // rad/s
    pub longitudinal: FinalAccelController,
    pub last_output: ControllerOutput,
}

impl Vehicle {
    pub fn new(
        config: FinalAccelConfig,
        geometry: VehicleGeometry,
        steering: SteeringBounds,
        max_steer_rate: f64,
    ) -> Result<Self, ConfigError> {
        geometry.validate()?;
        ensure_ordered("steering.min", steering.min, "steering.max", steering.max)?;
        ensure_positive("max_steer_rate", max_steer_rate)?;

        Ok(Self {
            state: VehicleKinematicState::default(),
            geometry,
            steering,
            max_steer_rate,
            longitudinal: FinalAccelController::new(config)?,
            last_output: ControllerOutput::default(),
        })
    }

    /// Place the vehicle at rest on the given pose.
    pub fn place(&mut self, x: f64, y: f64, psi: f64) {
        self.state = VehicleKinematicState { x, y, psi, v: 0.0, delta: 0.0 };
        self.longitudinal.reset();
        self.last_output = ControllerOutput::default();
    }

    /// Steering rate that moves delta toward `steer * max_angle`, `steer` in [-1, 1].
    pub fn steering_rate_toward(&self, steer: f64, dt: f64) -> f64 {
        if dt <= 0.0 {
            return 0.0;
        }
        let steer = if steer.is_finite() { steer.clamp(-1.0, 1.0) } else { 0.0 };
        let target = if steer >= 0.0 { steer * self.steering.max } else { -steer * self.steering.min };
        ((target - self.state.delta) / dt).clamp(-self.max_steer_rate, self.max_steer_rate)
    }

    pub fn step(&mut self, intent: DriverIntent, steering_rate: f64, dt: f64) -> &ControllerOutput {
        let rate = if steering_rate.is_finite() {
            steering_rate.clamp(-self.max_steer_rate, self.max_steer_rate)
        } else {
            0.0
        };

        self.last_output = self.longitudinal.step(intent, self.state.v, dt);
        self.state = integrate_kinematic(
            &self.state,
            &self.geometry,
            rate,
            self.last_output.acceleration,
            dt,
            Some(self.steering),
        );

        // no reverse gear; a braked car inside the stop window is held
        let hold = intent.brake > 0.0 && self.state.v <= self.longitudinal.config().stop_speed_epsilon;
        if self.state.v < 0.0 || hold {
            self.state.v = 0.0;
        }

        &self.last_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn straight_line_motion() {
        let s = VehicleKinematicState { v: 10.0, ..Default::default() };
        let next = integrate_kinematic(&s, &COMPACT_EV_GEOMETRY, 0.0, 1.0, 0.1, None);
        assert_abs_diff_eq!(next.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(next.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(next.v, 10.1, epsilon = 1e-12);
        assert_eq!(next.psi, 0.0);
    }

    #[test]
    fn positive_steering_turns_left() {
        let s = VehicleKinematicState { v: 10.0, delta: 0.1, ..Default::default() };
        let next = integrate_kinematic(&s, &COMPACT_EV_GEOMETRY, 0.0, 0.0, 0.1, None);
        assert!(next.psi > 0.0);
        assert!(next.y > 0.0);
    }

    #[test]
    fn steering_bounds_saturate_delta() {
        let s = VehicleKinematicState::default();
        let next = integrate_kinematic(&s, &COMPACT_EV_GEOMETRY, 100.0, 0.0, 0.1, Some(COMPACT_EV_STEERING));
        assert_eq!(next.delta, COMPACT_EV_STEERING.max);
    }

    #[test]
    fn geometry_validation() {
        assert!(COMPACT_EV_GEOMETRY.validate().is_ok());
        assert!(VehicleGeometry { wheelbase: 0.0, rear_axle_offset: None }.validate().is_err());
        assert!(VehicleGeometry { wheelbase: 2.0, rear_axle_offset: Some(2.5) }.validate().is_err());
        assert!(VehicleGeometry { wheelbase: 2.0, rear_axle_offset: Some(-0.1) }.validate().is_err());
        assert_eq!(VehicleGeometry { wheelbase: 2.0, rear_axle_offset: None }.lr(), 1.0);
    }

    #[test]
    fn pedal_mapping_splits_on_sign() {
        let up = pedal_intent_for(2.0, &COMPACT_EV);
        assert_eq!(up.brake, 0.0);
        assert_abs_diff_eq!(up.throttle, 0.5, epsilon = 1e-12);

        let down = pedal_intent_for(-4.5, &COMPACT_EV);
        assert_eq!(down.throttle, 0.0);
        assert_abs_diff_eq!(down.brake, 0.5, epsilon = 1e-12);

        assert_eq!(pedal_intent_for(-100.0, &COMPACT_EV).brake, 1.0);
    }

    #[test]
    fn vehicle_drives_and_stops_without_reversing() {
        let mut car =
            Vehicle::new(COMPACT_EV, COMPACT_EV_GEOMETRY, COMPACT_EV_STEERING, COMPACT_EV_MAX_STEER_RATE).unwrap();
        for _ in 0..300 {
            car.step(DriverIntent { throttle: 1.0, brake: 0.0 }, 0.0, 0.01);
        }
        assert!(car.state.v > 5.0);
        assert!(car.state.x > 0.0);

        for _ in 0..1_000 {
            car.step(DriverIntent { throttle: 0.0, brake: 1.0 }, 0.0, 0.01);
        }
        assert_eq!(car.state.v, 0.0);
    }

    #[test]
    fn steering_rate_is_rate_limited() {
        let car =
            Vehicle::new(COMPACT_EV, COMPACT_EV_GEOMETRY, COMPACT_EV_STEERING, COMPACT_EV_MAX_STEER_RATE).unwrap();
        assert_eq!(car.steering_rate_toward(1.0, 0.01), COMPACT_EV_MAX_STEER_RATE);
        assert_eq!(car.steering_rate_toward(-1.0, 0.01), -COMPACT_EV_MAX_STEER_RATE);
        assert_eq!(car.steering_rate_toward(0.0, 0.01), 0.0);
    }
}
