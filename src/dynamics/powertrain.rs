// ==============================================================================
// powertrain.rs — ELECTRIC DRIVE / REGEN + STATE OF CHARGE
// ==============================================================================
// Torque limits:
//   drive: min(max_drive_torque, max_power / w)         (w = |v| / r_wheel)
//   regen: min(max_regen_torque, max_regen_power / w)
//   near w == 0 the power curve is undefined, the torque cap applies alone
//
// Energy:
//   P_mech_drive =  T_drive * w            (>= 0)
//   P_mech_regen = -T_regen * w            (<= 0)
//   P_batt = P_mech_drive / eta_drive + P_mech_regen * eta_regen
//   soc -= P_batt * dt / (capacity_kwh * 3.6e6), clamped to [min_soc, max_soc]
//
// The model exclusively owns SoC. One instance per vehicle, not shared.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ensure_non_negative, ensure_ordered, ensure_positive};

/// Regen is disabled below this wheel speed (m/s).
pub const MIN_REGEN_SPEED: f64 = 0.5;

// below this wheel angular speed (rad/s) the power limit is ignored
const MIN_POWER_LIMIT_OMEGA: f64 = 1e-3;

const JOULES_PER_KWH: f64 = 3.6e6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowertrainConfig {
    pub max_drive_torque: f64,     // N*m at the wheel
    pub max_regen_torque: f64,     // N*m at the wheel
    pub max_power: f64,            // W
    pub max_regen_power: f64,      // W
    pub drive_efficiency: f64,     // (0, 1]
    pub regen_efficiency: f64,     // [0, 1]
    pub battery_capacity_kwh: f64, // kWh
    pub min_soc: f64,              // 0..1
    pub max_soc: f64,              // 0..1
    pub initial_soc: f64,          // 0..1
    pub wheel_radius: f64,         // m
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PowertrainOutput {
    pub total_torque: f64,     // drive - regen, N*m
    pub drive_torque: f64,     // N*m
    pub regen_torque: f64,     // N*m (positive magnitude)
    pub mechanical_power: f64, // W, negative while regenerating
    pub battery_power: f64,    // W drawn from the pack, negative while charging
}

#[derive(Debug, Clone)]
pub struct PowertrainModel {
    config: PowertrainConfig,
    soc: f64,
}

impl PowertrainModel {
    pub fn new(config: PowertrainConfig) -> Result<Self, ConfigError> {
        ensure_non_negative("powertrain.max_drive_torque", config.max_drive_torque)?;
        ensure_non_negative("powertrain.max_regen_torque", config.max_regen_torque)?;
        ensure_non_negative("powertrain.max_power", config.max_power)?;
        ensure_non_negative("powertrain.max_regen_power", config.max_regen_power)?;

        ensure_positive("powertrain.drive_efficiency", config.drive_efficiency)?;
        ensure_ordered("powertrain.drive_efficiency", config.drive_efficiency, "1", 1.0)?;
        ensure_non_negative("powertrain.regen_efficiency", config.regen_efficiency)?;
        ensure_ordered("powertrain.regen_efficiency", config.regen_efficiency, "1", 1.0)?;

        ensure_non_negative("powertrain.min_soc", config.min_soc)?;
        ensure_ordered("powertrain.min_soc", config.min_soc, "powertrain.initial_soc", config.initial_soc)?;
        ensure_ordered("powertrain.initial_soc", config.initial_soc, "powertrain.max_soc", config.max_soc)?;
        ensure_ordered("powertrain.max_soc", config.max_soc, "1", 1.0)?;

        ensure_positive("powertrain.battery_capacity_kwh", config.battery_capacity_kwh)?;
        ensure_positive("powertrain.wheel_radius", config.wheel_radius)?;

        Ok(Self { config, soc: config.initial_soc })
    }

    pub fn config(&self) -> &PowertrainConfig {
        &self.config
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    pub fn reset(&mut self) {
        self.soc = self.config.initial_soc;
    }

    #[inline]
    fn wheel_omega(&self, speed: f64) -> f64 {
        speed.abs() / self.config.wheel_radius
    }

    /// Maximum drive torque the pack and motor can deliver at `speed`.
    pub fn available_drive_torque(&self, speed: f64) -> f64 {
        if self.soc <= self.config.min_soc {
            return 0.0;
        }

        let omega = self.wheel_omega(speed);
        let power_limited = if omega < MIN_POWER_LIMIT_OMEGA {
            self.config.max_drive_torque
        } else {
            self.config.max_power / omega
        };

        power_limited.min(self.config.max_drive_torque).max(0.0)
    }

    /// Maximum regenerative braking torque the pack can absorb at `speed`.
    pub fn available_regen_torque(&self, speed: f64) -> f64 {
        if self.soc >= self.config.max_soc || speed.abs() < MIN_REGEN_SPEED {
            return 0.0;
        }

        let omega = self.wheel_omega(speed);
        (self.config.max_regen_power / omega)
            .min(self.config.max_regen_torque)
            .max(0.0)
    }

    /// Advance the powertrain by `dt` seconds and integrate SoC.
    pub fn step(&mut self, throttle: f64, regen_torque_request: f64, speed: f64, dt: f64) -> PowertrainOutput {
        let throttle = finite_or_zero(throttle).clamp(0.0, 1.0);
        let regen_request = finite_or_zero(regen_torque_request).max(0.0);
        let speed = finite_or_zero(speed);
        let dt = finite_or_zero(dt).max(0.0);

        let drive_torque = (throttle * self.config.max_drive_torque)
            .min(self.available_drive_torque(speed));
        let regen_torque = regen_request.min(self.available_regen_torque(speed));

        let omega = self.wheel_omega(speed);
        let drive_power = drive_torque * omega;
        let regen_power = -regen_torque * omega;

        let battery_power =
            drive_power / self.config.drive_efficiency + regen_power * self.config.regen_efficiency;

        let capacity_j = self.config.battery_capacity_kwh * JOULES_PER_KWH;
        self.soc = (self.soc - battery_power * dt / capacity_j)
            .clamp(self.config.min_soc, self.config.max_soc);

        PowertrainOutput {
            total_torque: drive_torque - regen_torque,
            drive_torque,
            regen_torque,
            mechanical_power: drive_power + regen_power,
            battery_power,
        }
    }
}

#[inline]
pub(crate) fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn config() -> PowertrainConfig {
        PowertrainConfig {
            max_drive_torque: 200.0,
            max_regen_torque: 150.0,
            max_power: 20_000.0,
            max_regen_power: 15_000.0,
            drive_efficiency: 0.9,
            regen_efficiency: 0.7,
            battery_capacity_kwh: 10.0,
            min_soc: 0.1,
            max_soc: 0.95,
            initial_soc: 0.5,
            wheel_radius: 0.3,
        }
    }

    #[test]
    fn power_limits_drive_torque_at_speed() {
        let pt = PowertrainModel::new(config()).unwrap();
        assert_relative_eq!(pt.available_drive_torque(100.0), 60.0, max_relative = 1e-12);
        assert_relative_eq!(pt.available_drive_torque(1.0), 200.0, max_relative = 1e-12);
        assert_relative_eq!(pt.available_drive_torque(0.0), 200.0, max_relative = 1e-12);
    }

    #[test]
    fn drive_unavailable_at_min_soc() {
        let pt = PowertrainModel::new(PowertrainConfig { initial_soc: 0.1, ..config() }).unwrap();
        assert_eq!(pt.available_drive_torque(10.0), 0.0);
    }

    #[test]
    fn regen_unavailable_when_full_or_slow() {
        let full = PowertrainModel::new(PowertrainConfig { initial_soc: 0.95, ..config() }).unwrap();
        assert_eq!(full.available_regen_torque(20.0), 0.0);

        let pt = PowertrainModel::new(config()).unwrap();
        assert_eq!(pt.available_regen_torque(0.2), 0.0);
        // 15 kW at 20 m/s / 0.3 m = 225 N*m, capped at 150
        assert_relative_eq!(pt.available_regen_torque(20.0), 150.0, max_relative = 1e-12);
        // 15 kW at 60 m/s -> 75 N*m
        assert_relative_eq!(pt.available_regen_torque(60.0), 75.0, max_relative = 1e-12);
    }

    #[test]
    fn driving_drains_and_regen_charges() {
        let mut pt = PowertrainModel::new(config()).unwrap();
        let out = pt.step(1.0, 0.0, 10.0, 1.0);
        assert_relative_eq!(out.drive_torque, 200.0, max_relative = 1e-12);
        assert!(out.battery_power > out.mechanical_power);
        assert!(pt.soc() < 0.5);

        let before = pt.soc();
        let out = pt.step(0.0, 100.0, 10.0, 1.0);
        assert_relative_eq!(out.regen_torque, 100.0, max_relative = 1e-12);
        assert!(out.mechanical_power < 0.0);
        assert!(out.battery_power > out.mechanical_power);
        assert!(pt.soc() > before);
    }

    #[test]
    fn battery_power_accounts_for_efficiency() {
        let mut pt = PowertrainModel::new(config()).unwrap();
        let out = pt.step(0.5, 0.0, 3.0, 0.0);
        let omega = 3.0 / 0.3;
        assert_relative_eq!(out.mechanical_power, 100.0 * omega, max_relative = 1e-12);
        assert_relative_eq!(out.battery_power, 100.0 * omega / 0.9, max_relative = 1e-12);
        // dt = 0 leaves SoC untouched
        assert_eq!(pt.soc(), 0.5);
    }

    #[test]
    fn reset_restores_initial_soc() {
        let mut pt = PowertrainModel::new(config()).unwrap();
        pt.step(1.0, 0.0, 20.0, 100.0);
        assert!(pt.soc() < 0.5);
        pt.reset();
        assert_eq!(pt.soc(), 0.5);
    }

    #[test]
    fn rejects_invalid_configs() {
        let bad = [
            PowertrainConfig { drive_efficiency: 0.0, ..config() },
            PowertrainConfig { drive_efficiency: 1.1, ..config() },
            PowertrainConfig { regen_efficiency: -0.1, ..config() },
            PowertrainConfig { min_soc: 0.6, ..config() },
            PowertrainConfig { max_soc: 0.4, ..config() },
            PowertrainConfig { max_soc: 1.2, initial_soc: 1.1, ..config() },
            PowertrainConfig { battery_capacity_kwh: 0.0, ..config() },
            PowertrainConfig { wheel_radius: f64::NAN, ..config() },
            PowertrainConfig { max_power: -1.0, ..config() },
        ];
        for cfg in bad {
            assert!(PowertrainModel::new(cfg).is_err(), "{cfg:?}");
        }
    }

    proptest! {
        #[test]
        fn soc_stays_in_bounds(
            steps in proptest::collection::vec(
                (0.0f64..1.0, 0.0f64..500.0, -80.0f64..80.0, 0.0f64..50.0),
                1..64,
            )
        ) {
            let cfg = PowertrainConfig { battery_capacity_kwh: 0.01, ..config() };
            let mut pt = PowertrainModel::new(cfg).unwrap();
            for (throttle, regen, speed, dt) in steps {
                pt.step(throttle, regen, speed, dt);
                prop_assert!(pt.soc() >= cfg.min_soc && pt.soc() <= cfg.max_soc);
            }
        }
    }
}
