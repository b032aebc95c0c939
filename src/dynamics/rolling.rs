// ==============================================================================
// rolling.rs — ROLLING RESISTANCE
// ==============================================================================
// F_rr = -c_rr * Fz * ramp(v)
// ramp fades linearly to zero inside +-blend_speed so the force never flips
// sign around standstill and never drives the car backwards.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ensure_non_negative, ensure_positive};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingResistanceConfig {
    pub coefficient: f64, // dimensionless c_rr
    pub blend_speed: f64, // m/s
}

#[derive(Debug, Clone, Copy)]
pub struct RollingResistanceModel {
    config: RollingResistanceConfig,
}

impl RollingResistanceModel {
    pub fn new(config: RollingResistanceConfig) -> Result<Self, ConfigError> {
        ensure_non_negative("rolling.coefficient", config.coefficient)?;
        ensure_positive("rolling.blend_speed", config.blend_speed)?;
        Ok(Self { config })
    }

    /// Resistive force [N] for the given speed and normal load.
    pub fn force(&self, speed: f64, normal_load: f64) -> f64 {
        let load = normal_load.max(0.0);
        let ramp = (speed / self.config.blend_speed).clamp(-1.0, 1.0);
        -self.config.coefficient * load * ramp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> RollingResistanceModel {
        RollingResistanceModel::new(RollingResistanceConfig { coefficient: 0.012, blend_speed: 0.5 })
            .unwrap()
    }

    #[test]
    fn saturates_above_blend_speed() {
        let m = model();
        assert_relative_eq!(m.force(20.0, 15_000.0), -180.0, max_relative = 1e-12);
        assert_relative_eq!(m.force(-20.0, 15_000.0), 180.0, max_relative = 1e-12);
    }

    #[test]
    fn fades_at_standstill() {
        let m = model();
        assert_eq!(m.force(0.0, 15_000.0), 0.0);
        assert_relative_eq!(m.force(0.25, 15_000.0), -90.0, max_relative = 1e-12);
    }

    #[test]
    fn scales_with_load_and_ignores_negative_load() {
        let m = model();
        assert_relative_eq!(m.force(5.0, 20_000.0), 2.0 * m.force(5.0, 10_000.0), max_relative = 1e-12);
        assert_eq!(m.force(5.0, -100.0), 0.0);
    }

    #[test]
    fn rejects_bad_config() {
        assert!(RollingResistanceModel::new(RollingResistanceConfig { coefficient: -0.1, blend_speed: 0.5 }).is_err());
        assert!(RollingResistanceModel::new(RollingResistanceConfig { coefficient: 0.01, blend_speed: 0.0 }).is_err());
    }
}
