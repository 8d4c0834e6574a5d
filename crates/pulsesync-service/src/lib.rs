//! pulsesync daemon
//!
//! Wires the scheduler core to a bulb actuator, loads configuration, and
//! optionally drives the scheduler from a synthetic drum pattern.

#![deny(clippy::unwrap_used)]
#![deny(unused_must_use)]

pub mod cli;
pub mod config;
pub mod daemon;
pub mod demo;
pub mod simulated;

pub use cli::Cli;
pub use config::{ConfigFormat, DemoConfig, ServiceConfig, SimulatedFailure, SimulationConfig};
pub use daemon::{DaemonReport, PulseDaemon};
pub use demo::DrumPattern;
pub use simulated::{BulbCounters, BulbCountersSnapshot, SimulatedBulb};
