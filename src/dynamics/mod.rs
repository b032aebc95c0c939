//! dynamics - engine-agnostic longitudinal/tire force models (pure types + stepping)

pub mod tire;
pub mod aero;
pub mod rolling;
pub mod powertrain;
pub mod brake_blend;
pub mod final_accel;

pub use aero::{AeroConfig, AeroModel};
pub use brake_blend::{BrakeBlend, BrakeBlendConfig, BrakeBlendController};
pub use final_accel::{ActuatorState, ControllerOutput, DriverIntent, FinalAccelConfig, FinalAccelController};
pub use powertrain::{PowertrainConfig, PowertrainModel, PowertrainOutput};
pub use rolling::{RollingResistanceConfig, RollingResistanceModel};
pub use tire::{TireForces, TireParameters};
