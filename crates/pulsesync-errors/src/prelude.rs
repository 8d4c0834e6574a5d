//! Prelude module for convenient error handling imports.
//!
//! # Example
//!
//! ```
//! use pulsesync_errors::prelude::*;
//!
//! fn require_address(address: &str) -> Result<&str> {
//!     if address.is_empty() {
//!         return Err(ConfigError::required("bulb_address").into());
//!     }
//!     Ok(address)
//! }
//!
//! assert!(require_address("").is_err());
//! ```

pub use crate::{
    ActuatorResult, Result,
    actuator::ActuatorError,
    common::{ErrorCategory, ErrorContext, ErrorSeverity, PulseSyncError, ResultExt},
    config::ConfigError,
    scheduler::SchedulerError,
};

/// Macro for creating an error context with key-value pairs.
///
/// # Example
///
/// ```
/// use pulsesync_errors::error_context;
///
/// let ctx = error_context!("load_config", "path" => "pulsesync.json");
/// assert!(ctx.to_string().contains("pulsesync.json"));
/// ```
#[macro_export]
macro_rules! error_context {
    ($operation:expr, $($key:expr => $value:expr),* $(,)?) => {
        {
            let mut ctx = $crate::ErrorContext::new($operation);
            $(
                ctx = ctx.with($key, $value);
            )*
            ctx
        }
    };
}
