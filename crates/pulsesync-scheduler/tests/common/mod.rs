//! Shared fixtures for the scheduler integration tests.

#![expect(dead_code, reason = "each test binary uses a different subset of these fixtures")]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulsesync_errors::{ActuatorError, ActuatorResult, ConfigError};
use pulsesync_scheduler::{
    ActuationSpec, ActuationTable, Actuator, DEFAULT_LABEL, PulseParameters, Rgb,
    SchedulerHandle,
};
use tokio::time::Instant;

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Submit `count` triggers `gap` apart, each stamped when it is submitted.
///
/// Returns the receive time of the first trigger.
pub async fn submit_every(handle: &SchedulerHandle, label: &str, count: u32, gap: Duration) -> Instant {
    let start = Instant::now();
    for i in 0..count {
        tokio::time::sleep_until(start + gap * i).await;
        handle.submit_now(label);
    }
    start
}

/// One `turn_on` seen by the recorder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activation {
    pub brightness: u8,
    pub at: Instant,
}

/// Actuator that records activations and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingActuator {
    activations: Arc<Mutex<Vec<Activation>>>,
    offs: Arc<Mutex<usize>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingActuator {
    pub fn activations(&self) -> Vec<Activation> {
        self.activations.lock().clone()
    }

    pub fn off_count(&self) -> usize {
        *self.offs.lock()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn turn_on(&mut self, parameters: &PulseParameters) -> ActuatorResult {
        self.activations.lock().push(Activation {
            brightness: parameters.brightness,
            at: Instant::now(),
        });
        if *self.failing.lock() {
            return Err(ActuatorError::unavailable("recorder"));
        }
        Ok(())
    }

    async fn turn_off(&mut self) -> ActuatorResult {
        *self.offs.lock() += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "recorder"
    }
}

/// Table where every label pulses for `pulse`; `brightness` tags the label.
pub fn uniform_table(pulse: Duration) -> Result<ActuationTable, ConfigError> {
    let pulse_ms = u64::try_from(pulse.as_millis()).unwrap_or(u64::MAX);
    let entries: HashMap<String, ActuationSpec> = [
        ("a", 1u8),
        ("b", 2),
        ("c", 3),
        (DEFAULT_LABEL, 9),
    ]
    .into_iter()
    .map(|(label, brightness)| {
        (
            label.to_string(),
            ActuationSpec::new(Rgb::WHITE, brightness, pulse_ms),
        )
    })
    .collect();
    ActuationTable::new(entries, pulse)
}
