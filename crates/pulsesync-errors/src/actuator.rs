//! Actuator (device port) error types.
//!
//! The physical device owns its own connection and retry concerns. The core
//! treats any of these as terminal for the single event being actuated.

use crate::common::ErrorSeverity;

/// Failures reported by an actuator implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActuatorError {
    /// Device could not be reached
    #[error("Actuator unavailable: {0}")]
    Unavailable(String),

    /// Device did not answer in time
    #[error("Actuator {device} timeout after {timeout_ms}ms")]
    Timeout {
        /// Device identifier
        device: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Device refused the requested parameters
    #[error("Actuator {device} rejected command: {reason}")]
    Rejected {
        /// Device identifier
        device: String,
        /// Reason given by the device
        reason: String,
    },

    /// Command failed for any other reason
    #[error("Actuator command '{command}' failed: {message}")]
    CommandFailed {
        /// Command name (turn_on, turn_off)
        command: String,
        /// Error message
        message: String,
    },
}

impl ActuatorError {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ActuatorError::Unavailable(_) => ErrorSeverity::Error,
            ActuatorError::Timeout { .. } => ErrorSeverity::Warning,
            ActuatorError::Rejected { .. } => ErrorSeverity::Warning,
            ActuatorError::CommandFailed { .. } => ErrorSeverity::Error,
        }
    }

    /// Check if this error indicates the device is unreachable.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(
            self,
            ActuatorError::Unavailable(_) | ActuatorError::Timeout { .. }
        )
    }

    /// Check if a later command might succeed.
    ///
    /// The dispatcher never retries a failed pulse; this only informs logging.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActuatorError::Timeout { .. })
    }

    /// Create an unavailable error.
    pub fn unavailable(device: impl Into<String>) -> Self {
        ActuatorError::Unavailable(device.into())
    }

    /// Create a timeout error.
    pub fn timeout(device: impl Into<String>, timeout_ms: u64) -> Self {
        ActuatorError::Timeout {
            device: device.into(),
            timeout_ms,
        }
    }

    /// Create a rejection error.
    pub fn rejected(device: impl Into<String>, reason: impl Into<String>) -> Self {
        ActuatorError::Rejected {
            device: device.into(),
            reason: reason.into(),
        }
    }

    /// Create a command failure.
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        ActuatorError::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }
}
