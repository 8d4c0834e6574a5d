//! Scheduler configuration.

use std::time::Duration;

use pulsesync_errors::ConfigError;
use serde::{Deserialize, Serialize};

use crate::dispatcher::DispatcherSettings;
use crate::latency::LatencyParams;

/// Longest allowed idle poll; bounds how long a stop request can go unseen.
pub const MAX_POLL_INTERVAL_MS: u64 = 1000;

/// Recognized scheduler options.
///
/// Durations are whole milliseconds so the struct maps directly onto config
/// files. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// End-to-end latency the operator aims for.
    pub target_latency_ms: u64,

    /// Estimated host-side overhead.
    pub system_overhead_ms: u64,

    /// Estimated device response time.
    pub actuator_response_ms: u64,

    /// Lower bound of the intentional delay.
    pub min_delay_ms: u64,

    /// Upper bound of the intentional delay.
    pub max_delay_ms: u64,

    /// Maximum number of pending events.
    pub max_queue_size: usize,

    /// Number of samples in the rolling statistics window.
    pub stats_window: usize,

    /// Dispatcher poll interval while idle.
    pub poll_interval_ms: u64,

    /// Errors within ± this band count as on time.
    pub early_late_threshold_ms: u64,

    /// Errors beyond ± this band are logged as warnings.
    pub significant_error_threshold_ms: u64,

    /// Minimum window size for automatic calibration.
    pub min_calibration_samples: usize,

    /// Log a stats summary every N dispatched events (0 disables).
    pub stats_report_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_latency_ms: 250,
            system_overhead_ms: 50,
            actuator_response_ms: 100,
            min_delay_ms: 1,
            max_delay_ms: 1000,
            max_queue_size: 100,
            stats_window: 1000,
            poll_interval_ms: 1,
            early_late_threshold_ms: 5,
            significant_error_threshold_ms: 20,
            min_calibration_samples: 10,
            stats_report_every: 50,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_latency(mut self, target: Duration) -> Self {
        self.target_latency_ms = millis(target);
        self
    }

    /// Set the overhead estimates.
    pub fn with_overheads(mut self, system: Duration, actuator_response: Duration) -> Self {
        self.system_overhead_ms = millis(system);
        self.actuator_response_ms = millis(actuator_response);
        self
    }

    /// Set the intentional delay bounds.
    pub fn with_delay_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay_ms = millis(min);
        self.max_delay_ms = millis(max);
        self
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn with_stats_window(mut self, samples: usize) -> Self {
        self.stats_window = samples;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = millis(interval);
        self
    }

    pub fn with_stats_report_every(mut self, events: u64) -> Self {
        self.stats_report_every = events;
        self
    }

    pub fn with_min_calibration_samples(mut self, samples: usize) -> Self {
        self.min_calibration_samples = samples;
        self
    }

    /// Normalize configuration to safe, bounded values.
    ///
    /// This ensures:
    /// - min_delay_ms <= max_delay_ms
    /// - queue, window, poll interval and calibration minimum are non-zero
    /// - poll interval is at most [`MAX_POLL_INTERVAL_MS`]
    /// - the significant-error band is not narrower than the early/late band
    pub fn normalize(&mut self) {
        if self.min_delay_ms > self.max_delay_ms {
            std::mem::swap(&mut self.min_delay_ms, &mut self.max_delay_ms);
        }
        self.max_queue_size = self.max_queue_size.max(1);
        self.stats_window = self.stats_window.max(1);
        self.poll_interval_ms = self.poll_interval_ms.clamp(1, MAX_POLL_INTERVAL_MS);
        self.min_calibration_samples = self.min_calibration_samples.max(1);
        self.significant_error_threshold_ms = self
            .significant_error_threshold_ms
            .max(self.early_late_threshold_ms);
    }

    /// Check the configuration without modifying it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_latency_ms == 0 {
            return Err(ConfigError::out_of_range(
                "target_latency_ms",
                self.target_latency_ms,
                1,
                u64::MAX,
            ));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::out_of_range(
                "min_delay_ms",
                self.min_delay_ms,
                0,
                self.max_delay_ms,
            ));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::out_of_range(
                "max_queue_size",
                self.max_queue_size,
                1,
                usize::MAX,
            ));
        }
        if self.stats_window == 0 {
            return Err(ConfigError::out_of_range(
                "stats_window",
                self.stats_window,
                1,
                usize::MAX,
            ));
        }
        if !(1..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(ConfigError::out_of_range(
                "poll_interval_ms",
                self.poll_interval_ms,
                1,
                MAX_POLL_INTERVAL_MS,
            ));
        }
        if self.min_calibration_samples == 0 {
            return Err(ConfigError::out_of_range(
                "min_calibration_samples",
                self.min_calibration_samples,
                1,
                usize::MAX,
            ));
        }
        Ok(())
    }

    /// Check if the configuration passes [`validate`](Self::validate).
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn target_latency(&self) -> Duration {
        Duration::from_millis(self.target_latency_ms)
    }

    /// Initial latency model terms.
    pub fn latency_params(&self) -> LatencyParams {
        LatencyParams::new(
            self.target_latency(),
            Duration::from_millis(self.system_overhead_ms),
            Duration::from_millis(self.actuator_response_ms),
        )
        .with_bounds(
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn early_late_threshold(&self) -> Duration {
        Duration::from_millis(self.early_late_threshold_ms)
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            poll_interval: Duration::from_millis(
                self.poll_interval_ms.clamp(1, MAX_POLL_INTERVAL_MS),
            ),
            significant_error_threshold: Duration::from_millis(
                self.significant_error_threshold_ms,
            ),
            stats_report_every: self.stats_report_every,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_constants() {
        let config = SchedulerConfig::default();
        assert!(config.is_valid());
        let params = config.latency_params();
        assert_eq!(params.target_latency, Duration::from_millis(250));
        assert_eq!(params.intentional_delay, Duration::from_millis(100));
        assert_eq!(params.min_delay, Duration::from_millis(1));
        assert_eq!(params.max_delay, Duration::from_millis(1000));

        let settings = config.dispatcher_settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(1));
        assert_eq!(settings.stats_report_every, 50);
    }

    #[test]
    fn test_builder() {
        let config = SchedulerConfig::new()
            .with_target_latency(Duration::from_millis(400))
            .with_overheads(Duration::from_millis(20), Duration::from_millis(30))
            .with_max_queue_size(8)
            .with_stats_window(16);
        assert_eq!(config.latency_params().intentional_delay, Duration::from_millis(350));
        assert_eq!(config.max_queue_size, 8);
        assert_eq!(config.stats_window, 16);
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let config = SchedulerConfig::new().with_max_queue_size(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { ref field, .. }) if field == "max_queue_size"
        ));
    }

    #[test]
    fn test_validate_rejects_reversed_bounds() {
        let config = SchedulerConfig::new()
            .with_delay_bounds(Duration::from_millis(500), Duration::from_millis(100));
        assert!(!config.is_valid());
    }

    #[test]
    fn test_poll_interval_is_bounded() {
        let mut config = SchedulerConfig::new().with_poll_interval(Duration::from_millis(u64::MAX));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { ref field, .. }) if field == "poll_interval_ms"
        ));
        assert_eq!(
            config.dispatcher_settings().poll_interval,
            Duration::from_millis(MAX_POLL_INTERVAL_MS)
        );

        config.normalize();
        assert_eq!(config.poll_interval_ms, MAX_POLL_INTERVAL_MS);
        assert!(config.is_valid());
    }

    #[test]
    fn test_normalize_repairs() {
        let mut config = SchedulerConfig::new()
            .with_delay_bounds(Duration::from_millis(500), Duration::from_millis(100))
            .with_max_queue_size(0)
            .with_poll_interval(Duration::ZERO)
            .with_min_calibration_samples(0);
        config.significant_error_threshold_ms = 1;
        config.normalize();

        assert!(config.is_valid());
        assert_eq!((config.min_delay_ms, config.max_delay_ms), (100, 500));
        assert_eq!(config.max_queue_size, 1);
        assert_eq!(config.poll_interval_ms, 1);
        assert_eq!(config.significant_error_threshold_ms, 5);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() -> Result<(), serde_json::Error> {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"target_latency_ms": 300, "max_queue_size": 4}"#)?;
        assert_eq!(config.target_latency_ms, 300);
        assert_eq!(config.max_queue_size, 4);
        assert_eq!(config.stats_window, 1000);
        Ok(())
    }
}
