//! Vehicle dynamics and trajectory-tracking control.
//!
//! - [`dynamics`]: tire, aero, rolling, powertrain, brake blend and the
//!   longitudinal orchestrator
//! - [`track`]: centerline arc-length maps
//! - [`mpcc`]: predictive contouring controller session (client + worker)
//! - [`vehicle`]: kinematic vehicle, presets
//! - [`params`]: vehicle parameter files

pub mod dynamics;
pub mod error;
pub mod mpcc;
pub mod params;
pub mod track;
pub mod vehicle;

pub use error::{ConfigError, ParamsError, ProtocolError};
