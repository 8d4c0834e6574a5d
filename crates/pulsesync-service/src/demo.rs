//! Synthetic trigger source.
//!
//! Plays a looping drum pattern into the scheduler at a fixed tempo, standing
//! in for the network listener when no live source is attached.

use std::time::Duration;

use pulsesync_errors::ConfigError;
use pulsesync_scheduler::SchedulerHandle;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::DemoConfig;

/// Looping pattern of labels, one per beat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrumPattern {
    steps: Vec<String>,
    step_interval: Duration,
}

impl DrumPattern {
    /// Parse a space-separated pattern played at `bpm` beats per minute.
    pub fn new(pattern: &str, bpm: u32) -> Result<Self, ConfigError> {
        if !(1..=600).contains(&bpm) {
            return Err(ConfigError::out_of_range("demo.bpm", bpm, 1, 600));
        }
        let steps: Vec<String> = pattern.split_whitespace().map(str::to_string).collect();
        if steps.is_empty() {
            return Err(ConfigError::required("demo.pattern"));
        }
        Ok(Self {
            steps,
            step_interval: Duration::from_secs(60) / bpm,
        })
    }

    pub fn from_config(config: &DemoConfig) -> Result<Self, ConfigError> {
        Self::new(&config.pattern, config.bpm)
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn step_interval(&self) -> Duration {
        self.step_interval
    }

    /// Submit steps until `shutdown` fires, returning how many were sent.
    pub async fn play(
        self,
        handle: SchedulerHandle,
        mut shutdown: broadcast::Receiver<()>,
    ) -> u64 {
        info!(
            steps = self.steps.len(),
            interval_ms = self.step_interval.as_millis() as u64,
            "Demo pattern started"
        );
        let mut ticker = tokio::time::interval(self.step_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut submitted = 0u64;
        for label in self.steps.iter().cycle() {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let sequence_id = handle.submit_now(label.as_str());
                    debug!(sequence_id, label = label.as_str(), "Demo trigger");
                    submitted += 1;
                }
            }
        }

        info!(submitted, "Demo pattern stopped");
        submitted
    }
}
