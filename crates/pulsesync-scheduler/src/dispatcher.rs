//! Serialized dispatch loop.
//!
//! The dispatcher is the only consumer of the [`EventQueue`] and the only
//! component that talks to the [`Actuator`]. Each cycle moves one event through
//! `Idle → Waiting → Actuating → Idle`:
//!
//! 1. **Idle**: poll the queue with a short timeout so a stop request is
//!    noticed quickly.
//! 2. **Waiting**: read the intentional delay once and sleep until
//!    `receive_time + intentional_delay`. Late events fire immediately. A stop
//!    request cuts the wait short and the event is discarded.
//! 3. **Actuating**: resolve the label, then on / hold / off. Not preemptible.
//! 4. Record `actuation_start - receive_time` as the measured latency.
//!
//! The loop only exits on an explicit stop. Actuator failures are logged and
//! counted; the event is not retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use pulsesync_errors::{ActuatorError, ErrorSeverity};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::actuator::{ActuationTable, Actuator, pulse};
use crate::event::Event;
use crate::latency::LatencyModel;
use crate::queue::EventQueue;
use crate::stats::{LatencySample, StatsAggregator, TimingClass};

/// Errors beyond ± this band are logged as warnings.
pub const SIGNIFICANT_ERROR_THRESHOLD: Duration = Duration::from_millis(20);

/// Idle poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Stats summary cadence, in dispatched events.
pub const DEFAULT_STATS_REPORT_EVERY: u64 = 50;

/// Observable dispatcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum DispatcherState {
    Idle = 0,
    Waiting = 1,
    Actuating = 2,
    Stopped = 3,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Waiting,
            2 => Self::Actuating,
            _ => Self::Stopped,
        }
    }
}

/// State, stop flag and counters shared between the dispatcher task and its
/// owners.
#[derive(Debug)]
pub struct DispatchControl {
    state: AtomicU8,
    stop: AtomicBool,
    stop_signal: Notify,
    dispatched: AtomicU64,
    failed: AtomicU64,
}

impl Default for DispatchControl {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(DispatcherState::Idle as u8),
            stop: AtomicBool::new(false),
            stop_signal: Notify::new(),
            dispatched: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

impl DispatchControl {
    /// Ask the loop to exit after the current actuation.
    ///
    /// An event still waiting for its deadline is abandoned.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.stop_signal.notify_waiters();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Events taken through a full actuation attempt.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Attempts where the actuator reported an error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    pub poll_interval: Duration,
    pub significant_error_threshold: Duration,
    /// Log a stats summary every N dispatched events (0 disables)
    pub stats_report_every: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            significant_error_threshold: SIGNIFICANT_ERROR_THRESHOLD,
            stats_report_every: DEFAULT_STATS_REPORT_EVERY,
        }
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub sequence_id: u64,
    pub actuation_start: Instant,
    pub sample: LatencySample,
    pub class: TimingClass,
    pub used_default: bool,
    pub error: Option<ActuatorError>,
}

/// Summary returned when the loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DispatchReport {
    pub dispatched: u64,
    pub failed: u64,
    /// Events still queued at shutdown and never actuated
    pub discarded: usize,
}

/// Single-consumer dispatch loop.
pub struct Dispatcher<A> {
    queue: Arc<EventQueue>,
    model: Arc<LatencyModel>,
    stats: Arc<StatsAggregator>,
    table: Arc<ActuationTable>,
    actuator: A,
    settings: DispatcherSettings,
    control: Arc<DispatchControl>,
    abandoned: usize,
}

impl<A: Actuator> Dispatcher<A> {
    pub fn new(
        queue: Arc<EventQueue>,
        model: Arc<LatencyModel>,
        stats: Arc<StatsAggregator>,
        table: Arc<ActuationTable>,
        actuator: A,
    ) -> Self {
        Self {
            queue,
            model,
            stats,
            table,
            actuator,
            settings: DispatcherSettings::default(),
            control: Arc::new(DispatchControl::default()),
            abandoned: 0,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: DispatcherSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Handle for observing state and requesting a stop.
    pub fn control(&self) -> Arc<DispatchControl> {
        Arc::clone(&self.control)
    }

    /// Run until a stop is requested, then turn the device off.
    pub async fn run(mut self) -> DispatchReport {
        info!(
            device = self.actuator.name(),
            poll_ms = self.settings.poll_interval.as_millis() as u64,
            "Dispatcher started"
        );

        while !self.control.stop_requested() {
            self.control.set_state(DispatcherState::Idle);
            if let Some(event) = self.queue.pop(self.settings.poll_interval).await {
                self.dispatch(event).await;
            }
        }

        self.release().await
    }

    /// Take one event through wait and actuation.
    ///
    /// Returns `None` when a stop request arrives before the deadline; the
    /// event is then counted as discarded and never actuated.
    pub async fn dispatch(&mut self, event: Event) -> Option<DispatchOutcome> {
        self.control.set_state(DispatcherState::Waiting);

        // One consistent read per cycle; adjustments apply from the next event.
        let params = self.model.current();
        if !self.wait_for_deadline(&event, params.intentional_delay).await {
            debug!(
                sequence_id = event.sequence_id(),
                label = event.label(),
                "Stop requested while waiting, event discarded"
            );
            self.abandoned = self.abandoned.saturating_add(1);
            self.control.set_state(DispatcherState::Idle);
            return None;
        }

        self.control.set_state(DispatcherState::Actuating);
        let resolved = self.table.resolve(event.label());
        let actuation_start = Instant::now();
        let result = pulse(&mut self.actuator, &resolved).await;

        let measured = actuation_start.saturating_duration_since(event.receive_time());
        let sample = LatencySample::new(measured, params.target_latency, result.is_ok())
            .with_generation(params.generation);
        let class = self.stats.record(sample);
        let dispatched = self.control.dispatched.fetch_add(1, Ordering::Relaxed) + 1;

        if let Err(err) = &result {
            self.control.failed.fetch_add(1, Ordering::Relaxed);
            if err.severity() >= ErrorSeverity::Error {
                error!(
                    sequence_id = event.sequence_id(),
                    label = event.label(),
                    device = self.actuator.name(),
                    unreachable = err.is_device_unavailable(),
                    error = %err,
                    "Actuation failed"
                );
            } else {
                warn!(
                    sequence_id = event.sequence_id(),
                    label = event.label(),
                    device = self.actuator.name(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "Actuation failed"
                );
            }
        }

        let latency_ms = measured.as_secs_f64() * 1000.0;
        if sample.is_significant(self.settings.significant_error_threshold) {
            warn!(
                sequence_id = event.sequence_id(),
                label = event.label(),
                latency_ms,
                error_ms = sample.error_ms(),
                "Significant timing error"
            );
        } else {
            debug!(
                sequence_id = event.sequence_id(),
                label = event.label(),
                latency_ms,
                error_ms = sample.error_ms(),
                ?class,
                "Dispatched event"
            );
        }

        let every = self.settings.stats_report_every;
        if every > 0 && dispatched.is_multiple_of(every) {
            info!(dispatched, stats = %self.stats.snapshot(), "Latency statistics");
        }

        self.control.set_state(DispatcherState::Idle);

        Some(DispatchOutcome {
            sequence_id: event.sequence_id(),
            actuation_start,
            sample,
            class,
            used_default: resolved.used_default,
            error: result.err(),
        })
    }

    /// Sleep until `receive_time + delay`. Returns `false` if a stop request
    /// arrived first.
    async fn wait_for_deadline(&self, event: &Event, delay: Duration) -> bool {
        let Some(deadline) = event.receive_time().checked_add(delay) else {
            return !self.control.stop_requested();
        };
        if deadline <= Instant::now() {
            trace!(
                sequence_id = event.sequence_id(),
                "Deadline already passed, actuating immediately"
            );
            return !self.control.stop_requested();
        }

        let stopped = self.control.stop_signal.notified();
        tokio::pin!(stopped);
        // Registered before the flag check so a concurrent stop is not missed.
        stopped.as_mut().enable();
        if self.control.stop_requested() {
            return false;
        }

        tokio::select! {
            () = tokio::time::sleep_until(deadline) => true,
            () = &mut stopped => false,
        }
    }

    async fn release(mut self) -> DispatchReport {
        let discarded = self.queue.clear().saturating_add(self.abandoned);
        if let Err(err) = self.actuator.turn_off().await {
            warn!(device = self.actuator.name(), error = %err, "Failed to release actuator");
        }
        self.control.set_state(DispatcherState::Stopped);

        let report = DispatchReport {
            dispatched: self.control.dispatched(),
            failed: self.control.failed(),
            discarded,
        };
        info!(
            dispatched = report.dispatched,
            failed = report.failed,
            discarded = report.discarded,
            "Dispatcher stopped"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::PulseParameters;
    use crate::calibration::Calibrator;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pulsesync_errors::ActuatorResult;
    use std::error::Error;
    use tracing_test::traced_test;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        On(Instant, u8),
        Off(Instant),
    }

    #[derive(Clone, Default)]
    struct StubBulb {
        calls: Arc<Mutex<Vec<Call>>>,
        failure: Option<ActuatorError>,
    }

    #[async_trait]
    impl Actuator for StubBulb {
        async fn turn_on(&mut self, parameters: &PulseParameters) -> ActuatorResult {
            self.calls
                .lock()
                .push(Call::On(Instant::now(), parameters.brightness));
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        async fn turn_off(&mut self) -> ActuatorResult {
            self.calls.lock().push(Call::Off(Instant::now()));
            Ok(())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn dispatcher(stub: StubBulb) -> (Dispatcher<StubBulb>, Arc<StatsAggregator>, Arc<EventQueue>) {
        let queue = Arc::new(EventQueue::with_capacity(8));
        let model = Arc::new(LatencyModel::default());
        let stats = Arc::new(StatsAggregator::new(100));
        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            model,
            Arc::clone(&stats),
            Arc::new(ActuationTable::reference()),
            stub,
        );
        (dispatcher, stats, queue)
    }

    fn failing(err: ActuatorError) -> StubBulb {
        StubBulb {
            failure: Some(err),
            ..StubBulb::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_waits_for_deadline() -> Result<(), Box<dyn Error>> {
        let stub = StubBulb::default();
        let (mut dispatcher, stats, _queue) = dispatcher(stub.clone());
        let received = Instant::now();

        let outcome = dispatcher
            .dispatch(Event::new("bd", received, 7))
            .await
            .ok_or("event discarded")?;

        // default model: 250 - 50 - 100 = 100ms intentional delay
        let waited = outcome.actuation_start.saturating_duration_since(received);
        assert!(waited >= ms(100) && waited < ms(102), "waited {waited:?}");
        assert_eq!(outcome.sample.measured_latency, waited);
        assert_eq!(outcome.class, TimingClass::Early);
        assert_eq!(outcome.error, None);
        assert_eq!(stats.len(), 1);

        let calls = stub.calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls.first(), Some(Call::On(_, 100))));
        assert!(matches!(calls.get(1), Some(Call::Off(_))));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_event_fires_immediately() -> Result<(), Box<dyn Error>> {
        let (mut dispatcher, _stats, _queue) = dispatcher(StubBulb::default());
        let received = Instant::now();
        tokio::time::advance(ms(300)).await;

        let before = Instant::now();
        let outcome = dispatcher
            .dispatch(Event::new("hh", received, 1))
            .await
            .ok_or("event discarded")?;
        assert!(outcome.actuation_start.saturating_duration_since(before) < ms(2));
        assert!(outcome.sample.measured_latency >= ms(300));
        assert_eq!(outcome.class, TimingClass::Late);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_label_uses_default() -> Result<(), Box<dyn Error>> {
        let stub = StubBulb::default();
        let (mut dispatcher, _stats, _queue) = dispatcher(stub.clone());
        let outcome = dispatcher
            .dispatch(Event::new("cowbell", Instant::now(), 1))
            .await
            .ok_or("event discarded")?;
        assert!(outcome.used_default);
        assert!(matches!(stub.calls.lock().first(), Some(Call::On(_, 50))));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_actuator_failure_is_logged_and_sampled() {
        let stub = failing(ActuatorError::timeout("stub", 500));
        let (mut dispatcher, stats, _queue) = dispatcher(stub.clone());
        let control = dispatcher.control();

        let Some(outcome) = dispatcher.dispatch(Event::new("sn", Instant::now(), 3)).await else {
            panic!("event discarded");
        };

        assert!(matches!(outcome.error, Some(ActuatorError::Timeout { .. })));
        assert_eq!(control.failed(), 1);
        assert_eq!(control.dispatched(), 1);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.failed_actuations, 1);
        // turned off even though turn_on failed
        assert!(matches!(stub.calls.lock().last(), Some(Call::Off(_))));
        assert!(logs_contain("Actuation failed"));
        assert!(logs_contain("retryable=true"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_unreachable_device_logged_as_error() {
        let stub = failing(ActuatorError::unavailable("stub"));
        let (mut dispatcher, _stats, _queue) = dispatcher(stub);

        let outcome = dispatcher.dispatch(Event::new("bd", Instant::now(), 1)).await;

        assert!(matches!(
            outcome.and_then(|o| o.error),
            Some(ActuatorError::Unavailable(_))
        ));
        assert!(logs_contain("ERROR"));
        assert!(logs_contain("unreachable=true"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_wait() {
        let stub = StubBulb::default();
        let (mut dispatcher, stats, _queue) = dispatcher(stub.clone());
        let control = dispatcher.control();
        let far_future = Instant::now() + Duration::from_secs(3600);
        let started = Instant::now();

        let (outcome, ()) = tokio::join!(
            dispatcher.dispatch(Event::new("bd", far_future, 1)),
            async {
                tokio::time::sleep(ms(10)).await;
                control.request_stop();
            }
        );

        assert_eq!(outcome, None);
        assert!(started.elapsed() < ms(20));
        assert!(stub.calls.lock().is_empty());
        assert!(stats.is_empty());
        assert_eq!(control.dispatched(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_not_blocked_by_pending_deadline() -> Result<(), Box<dyn Error>> {
        let stub = StubBulb::default();
        let (dispatcher, _stats, queue) = dispatcher(stub.clone());
        let control = dispatcher.control();
        let task = tokio::spawn(dispatcher.run());

        queue.push(Event::new("bd", Instant::now() + Duration::from_secs(3600), 1));
        queue.push(Event::new("sn", Instant::now(), 2));
        tokio::time::sleep(ms(10)).await;
        assert_eq!(control.state(), DispatcherState::Waiting);

        control.request_stop();
        let report = tokio::time::timeout(Duration::from_secs(1), task).await??;
        assert_eq!(report.dispatched, 0);
        assert_eq!(report.discarded, 2);
        // only the final release
        assert!(matches!(stub.calls.lock().as_slice(), [Call::Off(_)]));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_from_before_calibration_stays_out_of_window() -> Result<(), Box<dyn Error>> {
        let model = Arc::new(LatencyModel::default());
        let stats = Arc::new(StatsAggregator::new(100).with_model(Arc::clone(&model)));
        for _ in 0..10 {
            stats.record(
                LatencySample::new(ms(300), ms(250), true).with_generation(model.generation()),
            );
        }
        let calibrator = Calibrator::new(Arc::clone(&model), Arc::clone(&stats));
        let mut dispatcher = Dispatcher::new(
            Arc::new(EventQueue::with_capacity(8)),
            Arc::clone(&model),
            Arc::clone(&stats),
            Arc::new(ActuationTable::reference()),
            StubBulb::default(),
        );

        // calibrate while the event is waiting on the old 100ms delay
        let (outcome, calibrated) = tokio::join!(
            dispatcher.dispatch(Event::new("bd", Instant::now(), 1)),
            async {
                tokio::time::sleep(ms(50)).await;
                calibrator.auto_calibrate()
            }
        );

        let outcome = outcome.ok_or("event discarded")?;
        assert_eq!(outcome.sample.measured_latency, ms(100));
        assert_eq!(calibrated?.new_delay(), ms(50));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.stale_samples, 1);
        assert_eq!(snapshot.total_recorded, 11);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_and_releases() -> Result<(), Box<dyn Error>> {
        let stub = StubBulb::default();
        let (dispatcher, _stats, queue) = dispatcher(stub.clone());
        let control = dispatcher.control();
        let task = tokio::spawn(dispatcher.run());

        queue.push(Event::new("bd", Instant::now(), 1));
        tokio::time::sleep(ms(300)).await;
        control.request_stop();

        let report = task.await?;
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.discarded, 0);
        assert_eq!(control.state(), DispatcherState::Stopped);
        // pulse off plus the final release
        let offs = stub
            .calls
            .lock()
            .iter()
            .filter(|call| matches!(call, Call::Off(_)))
            .count();
        assert_eq!(offs, 2);
        Ok(())
    }

    #[test]
    fn test_state_round_trip() {
        let control = DispatchControl::default();
        assert_eq!(control.state(), DispatcherState::Idle);
        for state in [
            DispatcherState::Waiting,
            DispatcherState::Actuating,
            DispatcherState::Stopped,
        ] {
            control.set_state(state);
            assert_eq!(control.state(), state);
        }
    }
}
