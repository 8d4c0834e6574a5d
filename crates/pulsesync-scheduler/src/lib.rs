//! Latency-compensated event scheduling for slow, high-latency actuators.
//!
//! Trigger events arrive with a receive timestamp. Each one is delayed so that
//! the physical effect lands at `receive_time + target_latency`, after which
//! the measured end-to-end latency is fed back into rolling statistics that
//! the operator can use to recalibrate the compensation delay at runtime.
//!
//! - **EventQueue**: bounded ingest mailbox, drop-oldest on overflow
//! - **LatencyModel**: overhead estimates and the intentional delay
//! - **Dispatcher**: single serialized wait-and-actuate loop
//! - **StatsAggregator**: rolling window of latency samples
//! - **Calibrator**: manual steps and one-shot automatic correction
//! - **Scheduler / SchedulerHandle**: assembly and operator control surface
//!
//! Timing is best effort. Accuracy is measured and reported, not enforced.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use pulsesync_errors::ActuatorResult;
//! use pulsesync_scheduler::prelude::*;
//!
//! struct Bulb;
//!
//! #[async_trait]
//! impl Actuator for Bulb {
//!     async fn turn_on(&mut self, _parameters: &PulseParameters) -> ActuatorResult {
//!         Ok(())
//!     }
//!
//!     async fn turn_off(&mut self) -> ActuatorResult {
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() {
//! let handle = Scheduler::new(SchedulerConfig::default(), ActuationTable::reference())
//!     .start(Bulb);
//! handle.submit_now("bd");
//! let stats = handle.show_stats();
//! println!("{stats}");
//! let _report = handle.shutdown().await;
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(unused_must_use)]

pub mod actuator;
pub mod calibration;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod event;
pub mod latency;
pub mod queue;
pub mod stats;

pub mod prelude;

pub use actuator::{
    ActuationSpec, ActuationTable, Actuator, PulseParameters, ResolvedActuation, Rgb,
};
pub use calibration::{AdjustmentKind, AdjustmentResult, Calibrator, DelayStep};
pub use config::SchedulerConfig;
pub use control::{ControlCommand, ControlResponse, Scheduler, SchedulerHandle};
pub use dispatcher::{
    DispatchControl, DispatchOutcome, DispatchReport, Dispatcher, DispatcherSettings,
    DispatcherState,
};
pub use event::Event;
pub use latency::{AdjustmentOutcome, LatencyModel, LatencyParams};
pub use queue::EventQueue;
pub use stats::{LatencySample, StatsAggregator, StatsSnapshot, TimingClass};

pub use actuator::{DEFAULT_LABEL, DEFAULT_PULSE_DURATION};
pub use calibration::MIN_CALIBRATION_SAMPLES;
pub use config::MAX_POLL_INTERVAL_MS;
pub use dispatcher::SIGNIFICANT_ERROR_THRESHOLD;
pub use latency::{
    DEFAULT_ACTUATOR_RESPONSE_TIME, DEFAULT_SYSTEM_OVERHEAD, DEFAULT_TARGET_LATENCY,
    MAX_INTENTIONAL_DELAY, MIN_INTENTIONAL_DELAY,
};
pub use queue::DEFAULT_MAX_QUEUE_SIZE;
pub use stats::{DEFAULT_STATS_WINDOW, EARLY_LATE_THRESHOLD};
