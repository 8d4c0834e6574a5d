//! Common error types and utilities used across all pulsesync crates.
//!
//! This module provides the top-level error enum that can wrap all sub-errors,
//! along with error classification, severity levels, and utility traits.

use core::fmt;

use crate::{ActuatorError, ConfigError, SchedulerError};

/// Top-level error type that can wrap all pulsesync sub-errors.
#[derive(Debug, thiserror::Error)]
pub enum PulseSyncError {
    /// Scheduler core errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Actuator (device port) errors
    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl PulseSyncError {
    /// Get the error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PulseSyncError::Scheduler(_) => ErrorCategory::Scheduler,
            PulseSyncError::Actuator(_) => ErrorCategory::Actuator,
            PulseSyncError::Config(_) => ErrorCategory::Config,
            PulseSyncError::Io(_) => ErrorCategory::IO,
            PulseSyncError::Other(_) => ErrorCategory::Other,
        }
    }

    /// Get the error severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PulseSyncError::Scheduler(e) => e.severity(),
            PulseSyncError::Actuator(e) => e.severity(),
            PulseSyncError::Config(e) => e.severity(),
            PulseSyncError::Io(_) => ErrorSeverity::Error,
            PulseSyncError::Other(_) => ErrorSeverity::Error,
        }
    }

    /// Check if this error is recoverable.
    pub fn is_recoverable(&self) -> bool {
        self.severity() < ErrorSeverity::Critical
    }

    /// Create a generic error with a message.
    pub fn other(msg: impl Into<String>) -> Self {
        PulseSyncError::Other(msg.into())
    }
}

impl From<std::io::Error> for PulseSyncError {
    fn from(e: std::io::Error) -> Self {
        PulseSyncError::Io(e)
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Queue, dispatcher and calibration errors
    Scheduler = 0,
    /// Device port errors
    Actuator = 1,
    /// Configuration errors
    Config = 2,
    /// I/O errors
    IO = 3,
    /// Other errors
    Other = 255,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Scheduler => write!(f, "Scheduler"),
            ErrorCategory::Actuator => write!(f, "Actuator"),
            ErrorCategory::Config => write!(f, "Config"),
            ErrorCategory::IO => write!(f, "IO"),
            ErrorCategory::Other => write!(f, "Other"),
        }
    }
}

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ErrorSeverity {
    /// Informational, no action required
    Info = 0,
    /// Warning, may require attention
    Warning = 1,
    /// Error, operation failed
    Error = 2,
    /// Critical, system may be in unstable state
    Critical = 3,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Context information attached to an error on its way up.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// The operation that was being performed
    pub operation: String,
    /// Additional context key-value pairs
    pub context: Vec<(String, String)>,
}

impl ErrorContext {
    /// Create a new error context for an operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            context: Vec::new(),
        }
    }

    /// Add a context key-value pair.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation: {}", self.operation)?;
        for (key, value) in &self.context {
            write!(f, ", {key}: {value}")?;
        }
        Ok(())
    }
}

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, ctx: ErrorContext) -> Result<T, PulseSyncError>;

    /// Add context with an operation name.
    fn with_context(self, operation: impl Into<String>) -> Result<T, PulseSyncError>;
}

impl<T, E: Into<PulseSyncError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, ctx: ErrorContext) -> Result<T, PulseSyncError> {
        self.map_err(|e| {
            let err: PulseSyncError = e.into();
            PulseSyncError::Other(format!("{ctx}: {err}"))
        })
    }

    fn with_context(self, operation: impl Into<String>) -> Result<T, PulseSyncError> {
        self.context(ErrorContext::new(operation))
    }
}
