// ==============================================================================
// final_accel.rs — LONGITUDINAL ORCHESTRATOR (ACTUATORS -> FORCES -> ACCEL)
// ==============================================================================
// One call to step():
//   1) first-order lag of throttle/brake actuators toward the driver intent;
//      a nonzero brake target zeroes the throttle actuator immediately
//   2) effective throttle = throttle * (1 - min(brake, 1))
//   3) available regen force -> brake blend (regen first, hydraulic top-up)
//   4) powertrain step with effective throttle + regen torque request
//   5) torque -> force; realized regen clipped to what the blender authorized,
//      any shortfall moves to hydraulic
//   6) drag, downforce (adds normal load), rolling resistance, net force,
//      a = F / m clamped to [accel_min, accel_max]
//   7) creep suppression near standstill while braking
//
// Sign conventions:
//   - drive force pushes +x
//   - braking forces oppose sign(v); at exactly v == 0 they produce no force
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::dynamics::aero::{AeroConfig, AeroModel};
use crate::dynamics::brake_blend::{BrakeBlendConfig, BrakeBlendController};
use crate::dynamics::powertrain::{PowertrainConfig, PowertrainModel, finite_or_zero};
use crate::dynamics::rolling::{RollingResistanceConfig, RollingResistanceModel};
use crate::error::{ConfigError, ensure_non_negative, ensure_ordered, ensure_positive};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalAccelConfig {
    pub mass: f64,               // kg
    pub wheel_radius: f64,       // m
    pub gravity: f64,            // m/s^2
    pub tau_throttle: f64,       // s
    pub tau_brake: f64,          // s
    pub accel_min: f64,          // m/s^2 (negative)
    pub accel_max: f64,          // m/s^2
    pub stop_speed_epsilon: f64, // m/s

    pub powertrain: PowertrainConfig,
    pub aero: AeroConfig,
    pub rolling: RollingResistanceConfig,
    pub brake: BrakeBlendConfig,
}

/// Driver (or autopilot) pedal intent, both nominally in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriverIntent {
    pub throttle: f64,
    pub brake: f64,
}

/// Lag-filtered pedal positions. Always in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ActuatorState {
    pub throttle: f64,
    pub brake: f64,
}

/// Full per-step breakdown for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ControllerOutput {
    pub acceleration: f64, // m/s^2

    // actuators
    pub throttle: f64,
    pub brake: f64,
    pub effective_throttle: f64,

    // forces, N
    pub drive_force: f64,
    pub regen_force: f64,
    pub hydraulic_force: f64,
    pub drag_force: f64,
    pub downforce: f64,
    pub normal_load: f64,
    pub rolling_resistance: f64,
    pub net_force: f64,

    // powertrain
    pub drive_torque: f64,     // N*m
    pub regen_torque: f64,     // N*m
    pub mechanical_power: f64, // W
    pub battery_power: f64,    // W
    pub soc: f64,
}

#[derive(Debug, Clone)]
pub struct FinalAccelController {
    config: FinalAccelConfig,
    actuators: ActuatorState,
    powertrain: PowertrainModel,
    brake: BrakeBlendController,
    aero: AeroModel,
    rolling: RollingResistanceModel,
}

// x += (target - x) * (1 - exp(-dt / tau))
#[inline]
fn lag(current: f64, target: f64, tau: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return current;
    }
    let alpha = 1.0 - (-dt / tau).exp();
    (current + (target - current) * alpha).clamp(0.0, 1.0)
}

#[inline]
fn motion_sign(speed: f64) -> f64 {
    if speed > 0.0 {
        1.0
    } else if speed < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl FinalAccelController {
    pub fn new(config: FinalAccelConfig) -> Result<Self, ConfigError> {
        ensure_positive("mass", config.mass)?;
        ensure_positive("wheel_radius", config.wheel_radius)?;
        ensure_non_negative("gravity", config.gravity)?;
        ensure_positive("tau_throttle", config.tau_throttle)?;
        ensure_positive("tau_brake", config.tau_brake)?;
        ensure_ordered("accel_min", config.accel_min, "accel_max", config.accel_max)?;
        ensure_non_negative("stop_speed_epsilon", config.stop_speed_epsilon)?;

        Ok(Self {
            config,
            actuators: ActuatorState::default(),
            powertrain: PowertrainModel::new(config.powertrain)?,
            brake: BrakeBlendController::new(config.brake)?,
            aero: AeroModel::new(config.aero)?,
            rolling: RollingResistanceModel::new(config.rolling)?,
        })
    }

    pub fn config(&self) -> &FinalAccelConfig {
        &self.config
    }

    pub fn actuators(&self) -> ActuatorState {
        self.actuators
    }

    pub fn soc(&self) -> f64 {
        self.powertrain.soc()
    }

    pub fn reset(&mut self) {
        self.actuators = ActuatorState::default();
        self.powertrain.reset();
    }

    pub fn step(&mut self, intent: DriverIntent, speed: f64, dt: f64) -> ControllerOutput {
        let cfg = self.config;
        let speed = finite_or_zero(speed);
        let dt = finite_or_zero(dt);

        let target_throttle = finite_or_zero(intent.throttle).clamp(0.0, 1.0);
        let target_brake = finite_or_zero(intent.brake).clamp(0.0, 1.0);
        let braking_requested = target_brake > 0.0;

        // --------------------------------------------------
        // 1) actuator lag, brake has hard priority
        // --------------------------------------------------
        self.actuators.brake = lag(self.actuators.brake, target_brake, cfg.tau_brake, dt);
        self.actuators.throttle = if braking_requested {
            0.0
        } else {
            lag(self.actuators.throttle, target_throttle, cfg.tau_throttle, dt)
        };
        let ActuatorState { throttle, brake } = self.actuators;

        // --------------------------------------------------
        // 2) braking suppresses residual throttle
        // --------------------------------------------------
        let effective_throttle = throttle * (1.0 - brake.min(1.0));

        // --------------------------------------------------
        // 3) regen-first blend
        // --------------------------------------------------
        let available_regen_force = self.powertrain.available_regen_torque(speed) / cfg.wheel_radius;
        let blend = self.brake.blend(brake, speed, available_regen_force);

        // --------------------------------------------------
        // 4) powertrain
        // --------------------------------------------------
        let regen_torque_request = blend.regen_force * cfg.wheel_radius;
        let pt = self.powertrain.step(effective_throttle, regen_torque_request, speed, dt);

        // --------------------------------------------------
        // 5) torque domain -> force domain, hydraulic covers the rest
        // --------------------------------------------------
        let drive_force = pt.drive_torque / cfg.wheel_radius;
        let realized_regen = pt.regen_torque / cfg.wheel_radius;
        let regen_force = realized_regen.min(blend.regen_force);
        let hydraulic_force = (blend.total() - regen_force).max(0.0);

        // --------------------------------------------------
        // 6) resistive forces + net
        // --------------------------------------------------
        let drag_force = self.aero.drag_force(speed);
        let downforce = self.aero.downforce(speed);
        let normal_load = cfg.mass * cfg.gravity + downforce;
        let rolling_resistance = self.rolling.force(speed, normal_load);

        let braking_force = -motion_sign(speed) * (regen_force + hydraulic_force);
        let net_force = drive_force + braking_force + drag_force + rolling_resistance;

        let raw = finite_or_zero(net_force / cfg.mass);
        let mut acceleration = raw.clamp(cfg.accel_min, cfg.accel_max);

        // --------------------------------------------------
        // 7) creep suppression
        // --------------------------------------------------
        if braking_requested && speed.abs() <= cfg.stop_speed_epsilon && acceleration < 0.0 {
            acceleration = 0.0_f64.clamp(cfg.accel_min, cfg.accel_max);
        }

        trace!(
            speed,
            throttle,
            brake,
            regen_force,
            hydraulic_force,
            acceleration,
            "final accel step"
        );

        ControllerOutput {
            acceleration,
            throttle,
            brake,
            effective_throttle,
            drive_force,
            regen_force,
            hydraulic_force,
            drag_force,
            downforce,
            normal_load,
            rolling_resistance,
            net_force,
            drive_torque: pt.drive_torque,
            regen_torque: pt.regen_torque,
            mechanical_power: pt.mechanical_power,
            battery_power: pt.battery_power,
            soc: self.powertrain.soc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::COMPACT_EV;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn controller() -> FinalAccelController {
        FinalAccelController::new(COMPACT_EV).unwrap()
    }

    fn intent(throttle: f64, brake: f64) -> DriverIntent {
        DriverIntent { throttle, brake }
    }

    #[test]
    fn brake_priority_forces_throttle_to_zero_at_standstill() {
        let mut c = controller();
        let out = c.step(intent(1.0, 1.0), 0.0, 0.01);
        assert_eq!(out.throttle, 0.0);
        assert_eq!(out.effective_throttle, 0.0);
        assert_eq!(c.actuators().throttle, 0.0);
        assert!(out.brake > 0.0);
    }

    #[test]
    fn brake_cuts_throttle_already_built_up() {
        let mut c = controller();
        for _ in 0..100 {
            c.step(intent(1.0, 0.0), 10.0, 0.01);
        }
        assert!(c.actuators().throttle > 0.9);

        let out = c.step(intent(1.0, 0.3), 10.0, 0.01);
        assert_eq!(out.throttle, 0.0);
        assert!(out.drive_force == 0.0);
    }

    #[test]
    fn actuators_follow_first_order_lag() {
        let mut c = controller();
        let tau = COMPACT_EV.tau_throttle;
        let out = c.step(intent(1.0, 0.0), 5.0, tau);
        assert_relative_eq!(out.throttle, 1.0 - (-1.0f64).exp(), max_relative = 1e-12);
    }

    #[test]
    fn zero_dt_holds_actuators() {
        let mut c = controller();
        let out = c.step(intent(1.0, 0.0), 5.0, 0.0);
        assert_eq!(out.throttle, 0.0);
    }

    #[test]
    fn throttle_accelerates_vehicle() {
        let mut c = controller();
        let mut last = ControllerOutput::default();
        for _ in 0..200 {
            last = c.step(intent(1.0, 0.0), 5.0, 0.01);
        }
        assert!(last.acceleration > 0.0);
        assert!(last.drive_force > 0.0);
        assert!(last.soc < COMPACT_EV.powertrain.initial_soc);
    }

    #[test]
    fn braking_at_speed_uses_regen_first() {
        let mut c = controller();
        let mut last = ControllerOutput::default();
        for _ in 0..200 {
            last = c.step(intent(0.0, 0.1), 20.0, 0.01);
        }
        assert!(last.regen_force > 0.0);
        assert!(last.acceleration < 0.0);
        assert!(last.battery_power < 0.0);
        // blended total is exactly the pedal demand
        assert_relative_eq!(
            last.regen_force + last.hydraulic_force,
            last.brake * COMPACT_EV.brake.max_brake_force,
            max_relative = 1e-9
        );
    }

    #[test]
    fn hydraulic_covers_regen_shortfall_when_pack_full() {
        let cfg = FinalAccelConfig {
            powertrain: PowertrainConfig { initial_soc: COMPACT_EV.powertrain.max_soc, ..COMPACT_EV.powertrain },
            ..COMPACT_EV
        };
        let mut c = FinalAccelController::new(cfg).unwrap();
        let out = c.step(intent(0.0, 1.0), 20.0, 0.1);
        assert_eq!(out.regen_force, 0.0);
        assert_relative_eq!(out.hydraulic_force, out.brake * cfg.brake.max_brake_force, max_relative = 1e-9);
    }

    #[test]
    fn creep_is_suppressed_near_standstill() {
        let mut c = controller();
        let out = c.step(intent(0.0, 1.0), 0.5 * COMPACT_EV.stop_speed_epsilon, 0.1);
        assert_eq!(out.acceleration, 0.0);
    }

    #[test]
    fn acceleration_is_clamped() {
        let cfg = FinalAccelConfig { accel_min: -0.5, accel_max: 0.5, ..COMPACT_EV };
        let mut c = FinalAccelController::new(cfg).unwrap();
        for _ in 0..100 {
            let out = c.step(intent(1.0, 0.0), 2.0, 0.05);
            assert!(out.acceleration <= 0.5);
        }
        for _ in 0..100 {
            let out = c.step(intent(0.0, 1.0), 30.0, 0.05);
            assert!(out.acceleration >= -0.5);
        }
    }

    #[test]
    fn reset_clears_actuators_and_soc() {
        let mut c = controller();
        for _ in 0..50 {
            c.step(intent(1.0, 0.0), 15.0, 0.1);
        }
        c.reset();
        assert_eq!(c.actuators(), ActuatorState::default());
        assert_eq!(c.soc(), COMPACT_EV.powertrain.initial_soc);
    }

    #[test]
    fn rejects_invalid_controller_bounds() {
        let bad = [
            FinalAccelConfig { mass: 0.0, ..COMPACT_EV },
            FinalAccelConfig { wheel_radius: -0.3, ..COMPACT_EV },
            FinalAccelConfig { tau_throttle: 0.0, ..COMPACT_EV },
            FinalAccelConfig { tau_brake: f64::NAN, ..COMPACT_EV },
            FinalAccelConfig { accel_min: 3.0, accel_max: 2.0, ..COMPACT_EV },
            FinalAccelConfig { stop_speed_epsilon: -0.1, ..COMPACT_EV },
        ];
        for cfg in bad {
            assert!(FinalAccelController::new(cfg).is_err());
        }
    }

    #[test]
    fn non_finite_inputs_stay_bounded() {
        let mut c = controller();
        let out = c.step(intent(f64::NAN, f64::INFINITY), f64::NAN, 0.01);
        assert!(out.acceleration.is_finite());
        let a = c.actuators();
        assert!((0.0..=1.0).contains(&a.throttle));
        assert!((0.0..=1.0).contains(&a.brake));
    }

    proptest! {
        #[test]
        fn acceleration_always_within_bounds(
            throttle in -2.0f64..2.0,
            brake in -2.0f64..2.0,
            speed in -120.0f64..120.0,
            dt in 0.0f64..1.0,
            mass in 1.0f64..5000.0,
        ) {
            let cfg = FinalAccelConfig { mass, ..COMPACT_EV };
            let mut c = FinalAccelController::new(cfg).unwrap();
            for _ in 0..3 {
                let out = c.step(DriverIntent { throttle, brake }, speed, dt);
                prop_assert!(out.acceleration >= cfg.accel_min && out.acceleration <= cfg.accel_max);
                prop_assert!((0.0..=1.0).contains(&out.throttle));
                prop_assert!((0.0..=1.0).contains(&out.brake));
            }
        }
    }
}
