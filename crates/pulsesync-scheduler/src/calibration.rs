//! Operator-triggered recalibration of the compensation delay.
//!
//! Automatic calibration is a one-shot proportional correction: the mean
//! measured latency is compared with the target and the full error is
//! subtracted from the intentional delay. The rolling window is then cleared so
//! the next calibration only sees samples taken with the corrected delay.

use std::sync::Arc;
use std::time::Duration;

use pulsesync_errors::SchedulerError;
use serde::Serialize;
use tracing::info;

use crate::latency::{AdjustmentOutcome, LatencyModel, nanos_to_ms, signed_nanos};
use crate::stats::StatsAggregator;

/// Minimum window size before automatic calibration is attempted.
pub const MIN_CALIBRATION_SAMPLES: usize = 10;

const MS: i64 = 1_000_000;

/// Operator nudges to the intentional delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DelayStep {
    /// +10 ms
    Increase,
    /// -10 ms
    Decrease,
    /// +50 ms
    IncreaseLarge,
    /// -50 ms
    DecreaseLarge,
}

impl DelayStep {
    /// Signed size of the step in nanoseconds.
    pub fn delta_ns(self) -> i64 {
        match self {
            Self::Increase => 10 * MS,
            Self::Decrease => -10 * MS,
            Self::IncreaseLarge => 50 * MS,
            Self::DecreaseLarge => -50 * MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdjustmentKind {
    Manual,
    Automatic,
}

/// Report of an applied calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdjustmentResult {
    pub kind: AdjustmentKind,
    pub outcome: AdjustmentOutcome,
    /// Mean latency the correction was derived from (automatic only)
    pub measured_mean: Option<Duration>,
    /// `measured_mean - target_latency` in nanoseconds (automatic only)
    pub error_ns: Option<i64>,
    pub samples_used: usize,
}

impl AdjustmentResult {
    pub fn previous_delay(&self) -> Duration {
        self.outcome.previous
    }

    pub fn new_delay(&self) -> Duration {
        self.outcome.current
    }
}

/// Applies manual and automatic corrections to a [`LatencyModel`].
#[derive(Debug, Clone)]
pub struct Calibrator {
    model: Arc<LatencyModel>,
    stats: Arc<StatsAggregator>,
    min_samples: usize,
}

impl Calibrator {
    pub fn new(model: Arc<LatencyModel>, stats: Arc<StatsAggregator>) -> Self {
        Self {
            model,
            stats,
            min_samples: MIN_CALIBRATION_SAMPLES,
        }
    }

    /// Require at least `min_samples` (minimum one) before auto-calibrating.
    #[must_use]
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Correct the delay by the mean error of the current window.
    ///
    /// Leaves the delay untouched and returns
    /// [`SchedulerError::InsufficientCalibrationData`] when the window holds
    /// fewer than the minimum number of samples. On success the window and the
    /// early/late counters are cleared. Events still in flight were scheduled
    /// with the old delay; their samples are kept out of the new window.
    pub fn auto_calibrate(&self) -> Result<AdjustmentResult, SchedulerError> {
        let snapshot = self.stats.snapshot();
        if snapshot.count < self.min_samples {
            info!(
                have = snapshot.count,
                need = self.min_samples,
                "Not enough samples to calibrate"
            );
            return Err(SchedulerError::InsufficientCalibrationData {
                have: snapshot.count,
                need: self.min_samples,
            });
        }

        let target = self.model.target_latency();
        let error_ns = signed_nanos(snapshot.mean, target);
        let outcome = self.model.apply_adjustment(error_ns.saturating_neg());
        self.stats.reset_from(outcome.generation);

        info!(
            samples = snapshot.count,
            mean_ms = snapshot.mean.as_secs_f64() * 1000.0,
            error_ms = nanos_to_ms(error_ns),
            previous_ms = outcome.previous.as_secs_f64() * 1000.0,
            delay_ms = outcome.current.as_secs_f64() * 1000.0,
            clamped = outcome.clamped,
            "Auto-calibrated intentional delay"
        );

        Ok(AdjustmentResult {
            kind: AdjustmentKind::Automatic,
            outcome,
            measured_mean: Some(snapshot.mean),
            error_ns: Some(error_ns),
            samples_used: snapshot.count,
        })
    }

    /// Apply an operator step. Statistics are not touched.
    pub fn manual_adjust(&self, step: DelayStep) -> AdjustmentResult {
        self.adjust_by(step.delta_ns())
    }

    /// Apply an arbitrary signed correction in nanoseconds.
    pub fn adjust_by(&self, delta_ns: i64) -> AdjustmentResult {
        let outcome = self.model.apply_adjustment(delta_ns);
        info!(
            delta_ms = nanos_to_ms(delta_ns),
            delay_ms = outcome.current.as_secs_f64() * 1000.0,
            clamped = outcome.clamped,
            "Adjusted intentional delay"
        );
        AdjustmentResult {
            kind: AdjustmentKind::Manual,
            outcome,
            measured_mean: None,
            error_ns: None,
            samples_used: 0,
        }
    }
}
