//! Error handling for the grip pipeline
//!
//! One error type shared by every crate in the workspace. Recoverable failures
//! (filter stages, transport writes, callbacks) are reported with these variants
//! and handled locally by their owners; only construction and connection
//! failures are returned to the caller.

use crate::arm_types::Joint;
use std::fmt;

/// Result type alias for grip pipeline operations
pub type GripResult<T> = Result<T, GripError>;

/// Error type for all grip pipeline operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum GripError {
    /// Configuration value out of range or inconsistent
    ConfigurationError {
        /// Description of the configuration error
        message: String,
    },

    /// Joint name that does not address one of the arm joints
    InvalidJoint {
        /// Name as supplied by the caller
        name: String,
    },

    /// Joint angle outside the mechanical range
    InvalidAngle {
        /// Joint being moved
        joint: Joint,
        /// Requested angle in degrees
        angle: i32,
    },

    /// Filter coefficients could not be designed
    FilterDesignError {
        /// Description of the design problem
        message: String,
    },

    /// A conditioning stage could not process the window
    FilterStageFailed {
        /// Stage name
        stage: &'static str,
        /// Why the stage failed
        reason: String,
    },

    /// Write or read on the actuator link failed
    TransportError {
        /// Description of the transport failure
        message: String,
    },

    /// Link could not be opened or the handshake went unanswered
    ConnectionFailed {
        /// Description of the connection failure
        reason: String,
    },

    /// Operation requires a connected dispatcher
    NotConnected,

    /// User supplied callback returned an error or panicked
    CallbackError {
        /// Callback failure description
        message: String,
    },

    /// Signal simulation error
    SimulationError {
        /// Simulation failure description
        message: String,
    },
}

impl fmt::Display for GripError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GripError::ConfigurationError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            GripError::InvalidJoint { name } => {
                write!(f, "Invalid joint '{}': expected one of base, shoulder, elbow, wrist", name)
            }
            GripError::InvalidAngle { joint, angle } => {
                write!(f, "Invalid angle {}° for joint {}: must be within 0-180", angle, joint)
            }
            GripError::FilterDesignError { message } => {
                write!(f, "Filter design error: {}", message)
            }
            GripError::FilterStageFailed { stage, reason } => {
                write!(f, "Filter stage '{}' failed: {}", stage, reason)
            }
            GripError::TransportError { message } => {
                write!(f, "Transport error: {}", message)
            }
            GripError::ConnectionFailed { reason } => {
                write!(f, "Connection failed: {}", reason)
            }
            GripError::NotConnected => write!(f, "Actuator link is not connected"),
            GripError::CallbackError { message } => {
                write!(f, "Callback error: {}", message)
            }
            GripError::SimulationError { message } => {
                write!(f, "Simulation error: {}", message)
            }
        }
    }
}

impl std::error::Error for GripError {}

impl From<std::io::Error> for GripError {
    fn from(err: std::io::Error) -> Self {
        GripError::TransportError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GripError {
    fn from(err: serde_json::Error) -> Self {
        GripError::ConfigurationError {
            message: format!("invalid JSON configuration: {}", err),
        }
    }
}

impl GripError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        GripError::ConfigurationError {
            message: message.into(),
        }
    }

    /// Whether the error was raised by the actuator link
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GripError::TransportError { .. } | GripError::ConnectionFailed { .. } | GripError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GripError::InvalidAngle { joint: Joint::Elbow, angle: 200 };
        assert_eq!(err.to_string(), "Invalid angle 200° for joint elbow: must be within 0-180");

        let err = GripError::InvalidJoint { name: "knee".to_string() };
        assert!(err.to_string().contains("knee"));
    }

    #[test]
    fn test_io_error_maps_to_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: GripError = io.into();
        assert!(err.is_transport());
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_json_error_maps_to_configuration() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: GripError = json_err.into();
        assert!(matches!(err, GripError::ConfigurationError { .. }));
        assert!(!err.is_transport());
    }
}
