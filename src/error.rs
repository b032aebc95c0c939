//! Error types shared by the force models, the track builder and the MPCC
//! session protocol.

use std::path::PathBuf;

use crate::mpcc::protocol::RequestKind;

/// Raised at construction time when a config is non-finite, out of range or
/// inconsistent. The instance is never built; callers rebuild with fixed values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl ConfigError {
    pub fn invalid(cause: impl Into<String>) -> Self {
        ConfigError::InvalidConfig(cause.into())
    }
}

/// Failures surfaced by an MPCC session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// `step`/`reset` issued before a successful `init`.
    #[error("controller session is not initialized")]
    NotInitialized,

    /// A request was issued while another one is still outstanding.
    #[error("controller session is busy with a pending {pending} request")]
    Busy { pending: RequestKind },

    /// The worker rejected the request; carries its message verbatim.
    #[error("worker failure: {0}")]
    WorkerFailure(String),

    /// The session was disposed or the worker went away.
    #[error("controller session disconnected")]
    Disconnected,
}

impl ProtocolError {
    /// `true` for caller mistakes that never reached the worker.
    pub fn is_misuse(&self) -> bool {
        matches!(self, ProtocolError::NotInitialized | ProtocolError::Busy { .. })
    }
}

/// Failures while loading vehicle parameter files.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("parameter file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

// ------------------------------------------------------------------
// validation helpers used by every config constructor
// ------------------------------------------------------------------

pub(crate) fn ensure_finite(field: &str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::invalid(format!("{field} must be finite (got {value})")))
    }
}

pub(crate) fn ensure_non_negative(field: &str, value: f64) -> Result<f64, ConfigError> {
    ensure_finite(field, value)?;
    if value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::invalid(format!("{field} must be >= 0 (got {value})")))
    }
}

pub(crate) fn ensure_positive(field: &str, value: f64) -> Result<f64, ConfigError> {
    ensure_finite(field, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::invalid(format!("{field} must be > 0 (got {value})")))
    }
}

pub(crate) fn ensure_ordered(
    low_field: &str,
    low: f64,
    high_field: &str,
    high: f64,
) -> Result<(), ConfigError> {
    ensure_finite(low_field, low)?;
    ensure_finite(high_field, high)?;
    if low <= high {
        Ok(())
    } else {
        Err(ConfigError::invalid(format!(
            "{low_field} ({low}) must not exceed {high_field} ({high})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_reject_bad_values() {
        assert!(ensure_finite("x", f64::NAN).is_err());
        assert!(ensure_non_negative("x", -1.0).is_err());
        assert!(ensure_positive("x", 0.0).is_err());
        assert!(ensure_ordered("lo", 2.0, "hi", 1.0).is_err());
        assert!(ensure_ordered("lo", 1.0, "hi", 1.0).is_ok());
    }

    #[test]
    fn misuse_classification() {
        assert!(ProtocolError::NotInitialized.is_misuse());
        assert!(ProtocolError::Busy { pending: RequestKind::Step }.is_misuse());
        assert!(!ProtocolError::WorkerFailure("boom".into()).is_misuse());
        assert!(!ProtocolError::Disconnected.is_misuse());
    }

    #[test]
    fn invalid_config_message_carries_cause() {
        let err = ConfigError::invalid("mass must be > 0");
        assert_eq!(err.to_string(), "invalid config: mass must be > 0");
    }
}
