//! Prelude module for common scheduler types.

pub use crate::actuator::{ActuationSpec, ActuationTable, Actuator, PulseParameters, Rgb};
pub use crate::calibration::{AdjustmentResult, DelayStep};
pub use crate::config::SchedulerConfig;
pub use crate::control::{ControlCommand, ControlResponse, Scheduler, SchedulerHandle};
pub use crate::dispatcher::{DispatchReport, DispatcherState};
pub use crate::latency::LatencyParams;
pub use crate::stats::StatsSnapshot;
pub use crate::{DEFAULT_TARGET_LATENCY, MIN_CALIBRATION_SAMPLES};
