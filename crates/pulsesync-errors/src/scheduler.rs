//! Scheduler core error types.
//!
//! These are reported to callers of the control surface or counted in
//! statistics. None of them stops the dispatch loop.

use core::fmt;

use crate::common::ErrorSeverity;

/// Errors raised by the event queue, dispatcher and calibrator.
///
/// # Examples
///
/// ```
/// use pulsesync_errors::{ErrorSeverity, SchedulerError};
///
/// let err = SchedulerError::InsufficientCalibrationData { have: 3, need: 10 };
/// assert_eq!(err.code(), 2);
/// assert_eq!(err.severity(), ErrorSeverity::Info);
/// assert!(err.is_recoverable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerError {
    /// The queue was full and its oldest event was evicted to admit a new one
    QueueOverflow {
        /// Sequence id of the evicted event
        evicted_sequence: u64,
    },
    /// Not enough latency samples to run automatic calibration
    InsufficientCalibrationData {
        /// Samples currently in the rolling window
        have: usize,
        /// Minimum samples required
        need: usize,
    },
    /// The dispatcher has already stopped
    Stopped,
}

impl SchedulerError {
    /// Get the numeric error code.
    pub fn code(self) -> u8 {
        match self {
            SchedulerError::QueueOverflow { .. } => 1,
            SchedulerError::InsufficientCalibrationData { .. } => 2,
            SchedulerError::Stopped => 3,
        }
    }

    /// Get the error severity.
    pub fn severity(self) -> ErrorSeverity {
        match self {
            SchedulerError::QueueOverflow { .. } => ErrorSeverity::Warning,
            SchedulerError::InsufficientCalibrationData { .. } => ErrorSeverity::Info,
            SchedulerError::Stopped => ErrorSeverity::Error,
        }
    }

    /// Check if the scheduler keeps operating normally after this error.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, SchedulerError::Stopped)
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::QueueOverflow { evicted_sequence } => {
                write!(f, "Event queue overflow, dropped event #{evicted_sequence}")
            }
            SchedulerError::InsufficientCalibrationData { have, need } => write!(
                f,
                "Need more data to calibrate: {have} samples collected, {need} required"
            ),
            SchedulerError::Stopped => write!(f, "Scheduler has been stopped"),
        }
    }
}

impl std::error::Error for SchedulerError {}
