//! Rolling end-to-end latency statistics.
//!
//! The dispatcher records one [`LatencySample`] per actuation attempt; the
//! operator and the calibrator read derived [`StatsSnapshot`]s.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::latency::{LatencyModel, nanos_to_ms, signed_nanos};
use crate::queue::EventQueue;

/// Default number of samples kept in the rolling window.
pub const DEFAULT_STATS_WINDOW: usize = 1000;

/// Errors within this band count as on time.
pub const EARLY_LATE_THRESHOLD: Duration = Duration::from_millis(5);

/// Timing class of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimingClass {
    Early,
    OnTime,
    Late,
}

/// One measured actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencySample {
    /// Time from trigger receipt to actuation start
    pub measured_latency: Duration,

    /// `measured_latency - target_latency` in nanoseconds
    pub error_ns: i64,

    /// Whether the actuator reported success
    pub actuated: bool,

    /// Latency model generation the event was scheduled with
    pub generation: u64,
}

impl LatencySample {
    pub fn new(measured_latency: Duration, target_latency: Duration, actuated: bool) -> Self {
        Self {
            measured_latency,
            error_ns: signed_nanos(measured_latency, target_latency),
            actuated,
            generation: 0,
        }
    }

    /// Tag the sample with the model generation its delay was read from.
    #[must_use]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    #[inline]
    pub fn error_ms(&self) -> f64 {
        nanos_to_ms(self.error_ns)
    }

    /// Classify against a symmetric on-time band.
    pub fn classify(&self, threshold: Duration) -> TimingClass {
        let band = signed_nanos(threshold, Duration::ZERO);
        if self.error_ns < -band {
            TimingClass::Early
        } else if self.error_ns > band {
            TimingClass::Late
        } else {
            TimingClass::OnTime
        }
    }

    /// Whether the error magnitude exceeds `threshold`.
    pub fn is_significant(&self, threshold: Duration) -> bool {
        u128::from(self.error_ns.unsigned_abs()) > threshold.as_nanos()
    }
}

/// Derived, read-only view of the statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Samples in the rolling window
    pub count: usize,
    pub mean: Duration,
    /// Sample standard deviation; zero with fewer than two samples
    pub stddev: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Mean signed error against the target, in nanoseconds
    pub mean_error_ns: i64,
    pub early_count: u64,
    pub late_count: u64,
    /// Samples recorded since the last reset (may exceed the window)
    pub recorded_since_reset: u64,
    /// Samples recorded since creation
    pub total_recorded: u64,
    pub failed_actuations: u64,
    /// Samples scheduled under a model generation older than the last reset
    pub stale_samples: u64,
    pub queue_depth: usize,
    /// Events evicted by queue overflow since creation
    pub dropped_events: u64,
    pub target_latency: Duration,
}

impl StatsSnapshot {
    pub fn early_percent(&self) -> f64 {
        percent(self.early_count, self.recorded_since_reset)
    }

    pub fn late_percent(&self) -> f64 {
        percent(self.late_count, self.recorded_since_reset)
    }

    #[inline]
    pub fn mean_error_ms(&self) -> f64 {
        nanos_to_ms(self.mean_error_ns)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(
                f,
                "no samples | target {}ms | queue {}",
                self.target_latency.as_millis(),
                self.queue_depth
            );
        }
        write!(
            f,
            "avg {:.1}ms (±{:.1}ms) | target {}ms | error {:+.1}ms | early {:.1}% | late {:.1}% | queue {}",
            self.mean.as_secs_f64() * 1000.0,
            self.stddev.as_secs_f64() * 1000.0,
            self.target_latency.as_millis(),
            self.mean_error_ms(),
            self.early_percent(),
            self.late_percent(),
            self.queue_depth
        )
    }
}

#[derive(Debug)]
struct Window {
    samples: VecDeque<LatencySample>,
    capacity: usize,
    early_count: u64,
    late_count: u64,
    recorded_since_reset: u64,
    /// Samples from earlier generations are kept out of the window
    min_generation: u64,
}

impl Window {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            early_count: 0,
            late_count: 0,
            recorded_since_reset: 0,
            min_generation: 0,
        }
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.early_count = 0;
        self.late_count = 0;
        self.recorded_since_reset = 0;
    }
}

/// Fixed-capacity rolling window of latency samples.
///
/// The lock guards only the window; it is never held across an await point
/// or an actuation. Snapshots copy the window and compute outside the lock.
#[derive(Debug)]
pub struct StatsAggregator {
    window: Mutex<Window>,
    threshold: Duration,
    total_recorded: AtomicU64,
    failed_actuations: AtomicU64,
    stale_samples: AtomicU64,
    queue: Option<Arc<EventQueue>>,
    model: Option<Arc<LatencyModel>>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_STATS_WINDOW)
    }
}

impl StatsAggregator {
    /// Create an aggregator keeping at most `capacity` samples (minimum one).
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Mutex::new(Window::new(capacity)),
            threshold: EARLY_LATE_THRESHOLD,
            total_recorded: AtomicU64::new(0),
            failed_actuations: AtomicU64::new(0),
            stale_samples: AtomicU64::new(0),
            queue: None,
            model: None,
        }
    }

    /// Use a custom early/late band.
    #[must_use]
    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Report depth and overflow count of `queue` in snapshots.
    #[must_use]
    pub fn with_queue(mut self, queue: Arc<EventQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Report the target latency of `model` in snapshots.
    #[must_use]
    pub fn with_model(mut self, model: Arc<LatencyModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Append a sample, evicting the oldest when the window is full.
    ///
    /// Samples tagged with a generation older than the one passed to the last
    /// [`reset_from`](Self::reset_from) only count towards lifetime totals.
    pub fn record(&self, sample: LatencySample) -> TimingClass {
        let class = sample.classify(self.threshold);

        self.total_recorded.fetch_add(1, Ordering::Relaxed);
        if !sample.actuated {
            self.failed_actuations.fetch_add(1, Ordering::Relaxed);
        }

        let mut window = self.window.lock();
        if sample.generation < window.min_generation {
            self.stale_samples.fetch_add(1, Ordering::Relaxed);
            return class;
        }
        if window.samples.len() == window.capacity {
            window.samples.pop_front();
        }
        window.samples.push_back(sample);
        window.recorded_since_reset += 1;
        match class {
            TimingClass::Early => window.early_count += 1,
            TimingClass::Late => window.late_count += 1,
            TimingClass::OnTime => {}
        }
        class
    }

    /// Compute a snapshot of the current window.
    pub fn snapshot(&self) -> StatsSnapshot {
        let (samples, early_count, late_count, recorded_since_reset) = {
            let window = self.window.lock();
            (
                window.samples.iter().copied().collect::<Vec<_>>(),
                window.early_count,
                window.late_count,
                window.recorded_since_reset,
            )
        };

        let count = samples.len();
        let (mean, stddev, min, max, mean_error_ns) = summarize(&samples);

        StatsSnapshot {
            count,
            mean,
            stddev,
            min,
            max,
            mean_error_ns,
            early_count,
            late_count,
            recorded_since_reset,
            total_recorded: self.total_recorded.load(Ordering::Relaxed),
            failed_actuations: self.failed_actuations.load(Ordering::Relaxed),
            stale_samples: self.stale_samples.load(Ordering::Relaxed),
            queue_depth: self.queue.as_ref().map_or(0, |q| q.len()),
            dropped_events: self.queue.as_ref().map_or(0, |q| q.overflow_count()),
            target_latency: self
                .model
                .as_ref()
                .map_or(Duration::ZERO, |m| m.target_latency()),
        }
    }

    /// Clear the window and the early/late counters.
    ///
    /// Lifetime totals are kept.
    pub fn reset(&self) {
        self.window.lock().clear();
    }

    /// Clear the window and reject later samples from generations before
    /// `generation`.
    pub fn reset_from(&self, generation: u64) {
        let mut window = self.window.lock();
        window.clear();
        window.min_generation = window.min_generation.max(generation);
    }

    /// Window contents, oldest first.
    pub fn recent_samples(&self) -> Vec<LatencySample> {
        self.window.lock().samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.window.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.lock().samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window.lock().capacity
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

fn summarize(samples: &[LatencySample]) -> (Duration, Duration, Duration, Duration, i64) {
    if samples.is_empty() {
        return (Duration::ZERO, Duration::ZERO, Duration::ZERO, Duration::ZERO, 0);
    }

    let n = samples.len() as f64;
    let latencies: Vec<f64> = samples
        .iter()
        .map(|s| s.measured_latency.as_nanos() as f64)
        .collect();
    let mean_ns = latencies.iter().sum::<f64>() / n;

    let stddev_ns = if samples.len() < 2 {
        0.0
    } else {
        let variance = latencies
            .iter()
            .map(|l| (l - mean_ns).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        variance.sqrt()
    };

    let mean_error_ns = samples.iter().map(|s| s.error_ns as f64).sum::<f64>() / n;

    let min = samples
        .iter()
        .map(|s| s.measured_latency)
        .min()
        .unwrap_or_default();
    let max = samples
        .iter()
        .map(|s| s.measured_latency)
        .max()
        .unwrap_or_default();

    (
        duration_from_nanos_f64(mean_ns),
        duration_from_nanos_f64(stddev_ns),
        min,
        max,
        mean_error_ns.round() as i64,
    )
}

fn duration_from_nanos_f64(nanos: f64) -> Duration {
    Duration::from_nanos(u64::try_from(nanos.round() as i64).unwrap_or(0))
}
