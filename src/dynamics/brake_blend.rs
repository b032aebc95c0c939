// ==============================================================================
// brake_blend.rs — REGEN-FIRST BRAKE BLENDING
// ==============================================================================
// demand    = brake_request * max_brake_force
// authority = available_regen_force * fade(|v|)     fade ramps 0..1 up to
//                                                   regen_fade_speed
// regen     = min(demand, authority)
// hydraulic = demand - regen
//
// Contract: regen <= available_regen_force, regen + hydraulic == demand is
// non-decreasing in brake_request, both forces >= 0.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::dynamics::powertrain::finite_or_zero;
use crate::error::{ConfigError, ensure_non_negative, ensure_positive};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrakeBlendConfig {
    pub max_brake_force: f64,  // N at full pedal
    pub regen_fade_speed: f64, // m/s, 0 disables the low-speed fade
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BrakeBlend {
    pub regen_force: f64,     // N
    pub hydraulic_force: f64, // N
}

impl BrakeBlend {
    pub fn total(&self) -> f64 {
        self.regen_force + self.hydraulic_force
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BrakeBlendController {
    config: BrakeBlendConfig,
}

impl BrakeBlendController {
    pub fn new(config: BrakeBlendConfig) -> Result<Self, ConfigError> {
        ensure_positive("brake.max_brake_force", config.max_brake_force)?;
        ensure_non_negative("brake.regen_fade_speed", config.regen_fade_speed)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BrakeBlendConfig {
        &self.config
    }

    // regen authority ramps in with speed so hydraulic brakes take the last
    // metres to standstill
    fn fade(&self, speed: f64) -> f64 {
        if self.config.regen_fade_speed == 0.0 {
            1.0
        } else {
            (speed.abs() / self.config.regen_fade_speed).clamp(0.0, 1.0)
        }
    }

    pub fn blend(&self, brake_request: f64, speed: f64, available_regen_force: f64) -> BrakeBlend {
        let request = finite_or_zero(brake_request).clamp(0.0, 1.0);
        let available = finite_or_zero(available_regen_force).max(0.0);

        let demand = request * self.config.max_brake_force;
        let authority = available * self.fade(finite_or_zero(speed));

        let regen_force = demand.min(authority);
        let hydraulic_force = (demand - regen_force).max(0.0);

        BrakeBlend { regen_force, hydraulic_force }
    }
}
