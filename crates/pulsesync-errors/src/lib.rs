//! Centralized error types for pulsesync
//!
//! This crate provides the error taxonomy shared by the scheduler core and the
//! daemon. None of these errors is fatal to the process: the dispatch loop only
//! stops on an explicit shutdown, and every failure is surfaced through logs and
//! statistics instead of crossing the ingest boundary.
//!
//! # Architecture
//!
//! - [`common`]: Top-level error type, severity and category classification
//! - [`scheduler`]: Errors raised by the queue, dispatcher and calibrator
//! - [`actuator`]: Failures reported by the physical device port
//! - [`config`]: Configuration loading and validation errors
//!
//! # Example
//!
//! ```
//! use pulsesync_errors::prelude::*;
//!
//! fn check_queue_size(size: usize) -> Result<usize> {
//!     if size == 0 {
//!         return Err(ConfigError::out_of_range("max_queue_size", size, 1, usize::MAX).into());
//!     }
//!     Ok(size)
//! }
//!
//! assert!(check_queue_size(0).is_err());
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod actuator;
pub mod common;
pub mod config;
pub mod prelude;
pub mod scheduler;

pub use actuator::ActuatorError;
pub use common::{ErrorCategory, ErrorContext, ErrorSeverity, PulseSyncError, ResultExt};
pub use config::ConfigError;
pub use scheduler::SchedulerError;

/// A specialized `Result` type for pulsesync operations.
pub type Result<T> = std::result::Result<T, PulseSyncError>;

/// Result of a single actuator command.
pub type ActuatorResult<T = ()> = std::result::Result<T, ActuatorError>;
