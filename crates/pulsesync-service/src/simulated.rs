//! Simulated smart bulb.
//!
//! Stands in for the network driver: every command takes a configurable time
//! to complete and `turn_on` can be made to fail periodically. Brightness
//! above 100 is rejected, as real bulbs do. Pulses are logged so the timing
//! can be followed in the daemon output.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pulsesync_errors::{ActuatorError, ActuatorResult};
use pulsesync_scheduler::{Actuator, PulseParameters};
use tracing::{debug, trace};

use crate::config::{SimulatedFailure, SimulationConfig};

/// Highest brightness the bulb accepts.
pub const MAX_BRIGHTNESS: u8 = 100;

/// Counters shared with observers of a [`SimulatedBulb`].
#[derive(Debug, Default)]
pub struct BulbCounters {
    pulses: AtomicU64,
    failures: AtomicU64,
    offs: AtomicU64,
    lit: AtomicBool,
}

/// Copy of [`BulbCounters`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulbCountersSnapshot {
    pub pulses: u64,
    pub failures: u64,
    pub offs: u64,
    pub lit: bool,
}

impl BulbCounters {
    pub fn snapshot(&self) -> BulbCountersSnapshot {
        BulbCountersSnapshot {
            pulses: self.pulses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            offs: self.offs.load(Ordering::Relaxed),
            lit: self.lit.load(Ordering::Relaxed),
        }
    }
}

/// In-process bulb driven by the dispatcher.
#[derive(Debug)]
pub struct SimulatedBulb {
    address: String,
    command_latency: Duration,
    fail_every: u64,
    failure: SimulatedFailure,
    attempts: u64,
    counters: Arc<BulbCounters>,
}

impl SimulatedBulb {
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_config(address, &SimulationConfig::default())
    }

    pub fn with_config(address: impl Into<String>, config: &SimulationConfig) -> Self {
        Self {
            address: address.into(),
            command_latency: Duration::from_millis(config.command_latency_ms),
            fail_every: config.fail_every,
            failure: config.failure,
            attempts: 0,
            counters: Arc::new(BulbCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<BulbCounters> {
        Arc::clone(&self.counters)
    }

    async fn command(&self) {
        if !self.command_latency.is_zero() {
            tokio::time::sleep(self.command_latency).await;
        }
    }

    fn failure(&self) -> ActuatorError {
        match self.failure {
            SimulatedFailure::Timeout => ActuatorError::timeout(
                self.address.clone(),
                u64::try_from(self.command_latency.as_millis()).unwrap_or(u64::MAX),
            ),
            SimulatedFailure::Unavailable => ActuatorError::unavailable(self.address.clone()),
            SimulatedFailure::CommandFailed => {
                ActuatorError::command_failed("turn_on", "simulated failure")
            }
        }
    }
}

#[async_trait]
impl Actuator for SimulatedBulb {
    async fn turn_on(&mut self, parameters: &PulseParameters) -> ActuatorResult {
        self.attempts = self.attempts.wrapping_add(1);
        self.command().await;

        if parameters.brightness > MAX_BRIGHTNESS {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            return Err(ActuatorError::rejected(
                self.address.clone(),
                format!("brightness {} above {MAX_BRIGHTNESS}", parameters.brightness),
            ));
        }
        if self.fail_every > 0 && self.attempts.is_multiple_of(self.fail_every) {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            return Err(self.failure());
        }

        self.counters.pulses.fetch_add(1, Ordering::Relaxed);
        self.counters.lit.store(true, Ordering::Relaxed);
        let rgb = parameters.rgb;
        debug!(
            bulb = %self.address,
            r = rgb.r,
            g = rgb.g,
            b = rgb.b,
            brightness = parameters.brightness,
            "Bulb on"
        );
        Ok(())
    }

    async fn turn_off(&mut self) -> ActuatorResult {
        self.command().await;
        self.counters.offs.fetch_add(1, Ordering::Relaxed);
        self.counters.lit.store(false, Ordering::Relaxed);
        trace!(bulb = %self.address, "Bulb off");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.address
    }
}
