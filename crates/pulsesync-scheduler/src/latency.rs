//! Latency compensation model.
//!
//! The scheduler delays every event so that the visible effect lands at
//! `receive_time + target_latency`. The part of that budget consumed by the
//! host and by the device itself is estimated up front; the remainder is the
//! intentional delay the dispatcher waits before actuating:
//!
//! ```text
//! intentional_delay = max(min_delay, target - system_overhead - actuator_response)
//!                     clamped to [min_delay, max_delay]
//! ```
//!
//! The model is a single shared instance. Readers always get a consistent copy
//! of every term through [`LatencyModel::current`]; writers replace the whole
//! value under a short write lock.

use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

/// Lower bound of the intentional delay.
pub const MIN_INTENTIONAL_DELAY: Duration = Duration::from_millis(1);
/// Upper bound of the intentional delay.
pub const MAX_INTENTIONAL_DELAY: Duration = Duration::from_millis(1000);
/// Initial estimate of host-side overhead.
pub const DEFAULT_SYSTEM_OVERHEAD: Duration = Duration::from_millis(50);
/// Initial estimate of the device response time.
pub const DEFAULT_ACTUATOR_RESPONSE_TIME: Duration = Duration::from_millis(100);
/// Default end-to-end latency the operator aims for.
pub const DEFAULT_TARGET_LATENCY: Duration = Duration::from_millis(250);

/// Snapshot of every term of the latency model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyParams {
    pub system_overhead: Duration,
    pub actuator_response_time: Duration,
    pub target_latency: Duration,
    pub intentional_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Bumped every time the delay or the target changes.
    pub generation: u64,
}

impl Default for LatencyParams {
    fn default() -> Self {
        Self::new(
            DEFAULT_TARGET_LATENCY,
            DEFAULT_SYSTEM_OVERHEAD,
            DEFAULT_ACTUATOR_RESPONSE_TIME,
        )
    }
}

impl LatencyParams {
    /// Build parameters with the default bounds and a computed delay.
    pub fn new(
        target_latency: Duration,
        system_overhead: Duration,
        actuator_response_time: Duration,
    ) -> Self {
        let mut params = Self {
            system_overhead,
            actuator_response_time,
            target_latency,
            intentional_delay: Duration::ZERO,
            min_delay: MIN_INTENTIONAL_DELAY,
            max_delay: MAX_INTENTIONAL_DELAY,
            generation: 0,
        };
        params.intentional_delay = params.compute_intentional_delay();
        params
    }

    /// Replace the delay bounds and recompute the delay.
    ///
    /// Reversed bounds are swapped.
    #[must_use]
    pub fn with_bounds(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self.intentional_delay = self.compute_intentional_delay();
        self
    }

    /// Delay implied by the current target and overhead terms.
    pub fn compute_intentional_delay(&self) -> Duration {
        let remaining = self
            .target_latency
            .saturating_sub(self.system_overhead)
            .saturating_sub(self.actuator_response_time);
        self.clamp_delay(remaining)
    }

    #[inline]
    fn clamp_delay(&self, delay: Duration) -> Duration {
        delay.max(self.min_delay).min(self.max_delay)
    }
}

/// Result of a change to the intentional delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdjustmentOutcome {
    pub previous: Duration,
    pub current: Duration,
    /// Signed change that was asked for, in nanoseconds.
    pub requested_delta_ns: i64,
    /// Whether the bounds absorbed part of the request.
    pub clamped: bool,
    /// Model generation after the change.
    pub generation: u64,
}

impl AdjustmentOutcome {
    /// Signed change actually applied, in nanoseconds.
    pub fn applied_delta_ns(&self) -> i64 {
        signed_nanos(self.current, self.previous)
    }
}

/// Shared, mutable latency model.
#[derive(Debug, Default)]
pub struct LatencyModel {
    params: RwLock<LatencyParams>,
}

impl LatencyModel {
    pub fn new(params: LatencyParams) -> Self {
        Self {
            params: RwLock::new(params),
        }
    }

    /// Consistent copy of every term.
    #[inline]
    pub fn current(&self) -> LatencyParams {
        *self.params.read()
    }

    #[inline]
    pub fn intentional_delay(&self) -> Duration {
        self.params.read().intentional_delay
    }

    #[inline]
    pub fn target_latency(&self) -> Duration {
        self.params.read().target_latency
    }

    /// Counter of changes applied to the model.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.params.read().generation
    }

    /// `(min_delay, max_delay)`.
    pub fn bounds(&self) -> (Duration, Duration) {
        let params = self.params.read();
        (params.min_delay, params.max_delay)
    }

    /// Delay implied by the formula, ignoring any adjustments applied since.
    pub fn compute_intentional_delay(&self) -> Duration {
        self.params.read().compute_intentional_delay()
    }

    /// Add a signed delta to the intentional delay and reclamp.
    ///
    /// Out-of-range requests are absorbed by the bounds; the outcome reports
    /// whether that happened.
    pub fn apply_adjustment(&self, delta_ns: i64) -> AdjustmentOutcome {
        let mut params = self.params.write();
        let previous = params.intentional_delay;
        let requested = offset(previous, delta_ns);
        let current = params.clamp_delay(requested);
        params.intentional_delay = current;
        params.generation = params.generation.wrapping_add(1);
        AdjustmentOutcome {
            previous,
            current,
            requested_delta_ns: delta_ns,
            clamped: current != requested,
            generation: params.generation,
        }
    }

    /// Change the target latency and recompute the delay from the formula.
    pub fn set_target_latency(&self, target_latency: Duration) -> AdjustmentOutcome {
        let mut params = self.params.write();
        let previous = params.intentional_delay;
        params.target_latency = target_latency;
        let unclamped = target_latency
            .saturating_sub(params.system_overhead)
            .saturating_sub(params.actuator_response_time);
        let current = params.compute_intentional_delay();
        params.intentional_delay = current;
        params.generation = params.generation.wrapping_add(1);
        AdjustmentOutcome {
            previous,
            current,
            requested_delta_ns: signed_nanos(unclamped, previous),
            clamped: current != unclamped,
            generation: params.generation,
        }
    }
}

/// `a - b` in signed nanoseconds, saturating at the `i64` range.
pub(crate) fn signed_nanos(a: Duration, b: Duration) -> i64 {
    let a = i128::try_from(a.as_nanos()).unwrap_or(i128::MAX);
    let b = i128::try_from(b.as_nanos()).unwrap_or(i128::MAX);
    let diff = a - b;
    i64::try_from(diff).unwrap_or(if diff > 0 { i64::MAX } else { i64::MIN })
}

/// Shift `base` by a signed nanosecond delta, saturating at zero.
pub(crate) fn offset(base: Duration, delta_ns: i64) -> Duration {
    let magnitude = Duration::from_nanos(delta_ns.unsigned_abs());
    if delta_ns >= 0 {
        base.saturating_add(magnitude)
    } else {
        base.saturating_sub(magnitude)
    }
}

/// Signed nanoseconds as fractional milliseconds, for logging.
#[inline]
pub(crate) fn nanos_to_ms(nanos: i64) -> f64 {
    nanos as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: i64 = 1_000_000;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_default_delay_follows_formula() {
        let params = LatencyParams::default();
        assert_eq!(params.intentional_delay, ms(100));
        assert_eq!(params.compute_intentional_delay(), ms(100));
    }

    #[test]
    fn test_delay_floors_at_minimum() {
        let params = LatencyParams::new(ms(100), ms(50), ms(100));
        assert_eq!(params.intentional_delay, MIN_INTENTIONAL_DELAY);
    }

    #[test]
    fn test_delay_caps_at_maximum() {
        let params = LatencyParams::new(ms(5000), ms(50), ms(100));
        assert_eq!(params.intentional_delay, MAX_INTENTIONAL_DELAY);
    }

    #[test]
    fn test_with_bounds_swaps_reversed() {
        let params = LatencyParams::default().with_bounds(ms(500), ms(200));
        assert_eq!(params.min_delay, ms(200));
        assert_eq!(params.max_delay, ms(500));
        assert_eq!(params.intentional_delay, ms(200));
    }

    #[test]
    fn test_apply_adjustment_within_bounds() {
        let model = LatencyModel::default();
        let outcome = model.apply_adjustment(10 * MS);
        assert_eq!(outcome.previous, ms(100));
        assert_eq!(outcome.current, ms(110));
        assert!(!outcome.clamped);
        assert_eq!(outcome.applied_delta_ns(), 10 * MS);
        assert_eq!(model.intentional_delay(), ms(110));
    }

    #[test]
    fn test_apply_adjustment_clamps_low() {
        let model = LatencyModel::default();
        let outcome = model.apply_adjustment(-500 * MS);
        assert_eq!(outcome.current, MIN_INTENTIONAL_DELAY);
        assert!(outcome.clamped);
        assert_eq!(outcome.applied_delta_ns(), -99 * MS);
    }

    #[test]
    fn test_apply_adjustment_clamps_high() {
        let model = LatencyModel::default();
        let outcome = model.apply_adjustment(i64::MAX);
        assert_eq!(outcome.current, MAX_INTENTIONAL_DELAY);
        assert!(outcome.clamped);
    }

    #[test]
    fn test_set_target_latency_recomputes() {
        let model = LatencyModel::default();
        model.apply_adjustment(25 * MS);
        let outcome = model.set_target_latency(ms(400));
        assert_eq!(outcome.previous, ms(125));
        assert_eq!(outcome.current, ms(250));
        assert_eq!(model.target_latency(), ms(400));
        assert!(!outcome.clamped);
    }

    #[test]
    fn test_every_change_bumps_generation() {
        let model = LatencyModel::default();
        assert_eq!(model.generation(), 0);
        assert_eq!(model.apply_adjustment(10 * MS).generation, 1);
        // clamped to the same value still counts as a change request
        assert_eq!(model.apply_adjustment(i64::MAX).generation, 2);
        assert_eq!(model.set_target_latency(ms(300)).generation, 3);
        assert_eq!(model.current().generation, 3);
    }

    #[test]
    fn test_signed_helpers() {
        assert_eq!(signed_nanos(ms(300), ms(250)), 50 * MS);
        assert_eq!(signed_nanos(ms(250), ms(300)), -50 * MS);
        assert_eq!(offset(ms(10), -20 * MS), Duration::ZERO);
        assert_eq!(offset(ms(10), 5 * MS), ms(15));
        assert!((nanos_to_ms(-1_500_000) + 1.5).abs() < f64::EPSILON);
    }
}
