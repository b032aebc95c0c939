// ==============================================================================
// aero.rs — DRAG + DOWNFORCE
// ==============================================================================
// Lumped coefficients (0.5 * rho * Cd * A folded into drag_coefficient):
//   drag      = -sign(v) * cd * v^2      (always opposes motion)
//   downforce = |cl| * v^2               (never lift)
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ensure_finite, ensure_non_negative};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AeroConfig {
    pub drag_coefficient: f64,      // N / (m/s)^2
    pub downforce_coefficient: f64, // N / (m/s)^2, sign ignored
}

#[derive(Debug, Clone, Copy)]
pub struct AeroModel {
    config: AeroConfig,
}

impl AeroModel {
    pub fn new(config: AeroConfig) -> Result<Self, ConfigError> {
        ensure_non_negative("aero.drag_coefficient", config.drag_coefficient)?;
        ensure_finite("aero.downforce_coefficient", config.downforce_coefficient)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AeroConfig {
        &self.config
    }

    /// Longitudinal drag force [N].
    pub fn drag_force(&self, speed: f64) -> f64 {
        if speed == 0.0 {
            return 0.0;
        }
        -speed.signum() * self.config.drag_coefficient * speed * speed
    }

    /// Additional normal load [N].
    pub fn downforce(&self, speed: f64) -> f64 {
        let cl = self.config.downforce_coefficient.abs();
        if cl == 0.0 || speed == 0.0 {
            return 0.0;
        }
        cl * speed * speed
    }
}
