//! Scheduler assembly and the operator control surface.
//!
//! [`Scheduler`] owns the shared state and spawns the dispatcher task;
//! [`SchedulerHandle`] is the cloneable front door used by the ingest side
//! (`submit`) and by the operator (`execute`).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pulsesync_errors::SchedulerError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

use crate::actuator::{ActuationTable, Actuator};
use crate::calibration::{AdjustmentResult, Calibrator, DelayStep};
use crate::config::SchedulerConfig;
use crate::dispatcher::{DispatchControl, DispatchReport, Dispatcher, DispatcherState};
use crate::event::Event;
use crate::latency::{AdjustmentOutcome, LatencyModel, LatencyParams};
use crate::queue::EventQueue;
use crate::stats::{StatsAggregator, StatsSnapshot};

/// Operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    ShowStats,
    Adjust(DelayStep),
    AutoCalibrate,
    ShowDelay,
    Shutdown,
}

/// Result of a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq)]
pub enum ControlResponse {
    Stats(StatsSnapshot),
    Adjusted(AdjustmentResult),
    Delay(LatencyParams),
    Stopped(DispatchReport),
    /// The command could not be carried out; nothing changed
    Rejected(SchedulerError),
}

/// Shared scheduler state, assembled but not yet running.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    queue: Arc<EventQueue>,
    model: Arc<LatencyModel>,
    stats: Arc<StatsAggregator>,
    table: Arc<ActuationTable>,
}

impl Scheduler {
    /// Build the shared state from a configuration.
    ///
    /// The configuration is normalized first.
    pub fn new(mut config: SchedulerConfig, table: ActuationTable) -> Self {
        config.normalize();

        let queue = Arc::new(EventQueue::with_capacity(config.max_queue_size));
        let model = Arc::new(LatencyModel::new(config.latency_params()));
        let stats = Arc::new(
            StatsAggregator::new(config.stats_window)
                .with_threshold(config.early_late_threshold())
                .with_queue(Arc::clone(&queue))
                .with_model(Arc::clone(&model)),
        );

        Self {
            config,
            queue,
            model,
            stats,
            table: Arc::new(table),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Spawn the dispatcher on the current tokio runtime.
    pub fn start<A>(self, actuator: A) -> SchedulerHandle
    where
        A: Actuator + 'static,
    {
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.model),
            Arc::clone(&self.stats),
            Arc::clone(&self.table),
            actuator,
        )
        .with_settings(self.config.dispatcher_settings());
        let control = dispatcher.control();

        let params = self.model.current();
        info!(
            target_ms = params.target_latency.as_millis() as u64,
            delay_ms = params.intentional_delay.as_millis() as u64,
            queue = self.queue.capacity(),
            labels = self.table.len(),
            "Starting scheduler"
        );
        let task = tokio::spawn(dispatcher.run());

        let calibrator = Calibrator::new(Arc::clone(&self.model), Arc::clone(&self.stats))
            .with_min_samples(self.config.min_calibration_samples);

        SchedulerHandle {
            inner: Arc::new(Inner {
                queue: self.queue,
                model: self.model,
                stats: self.stats,
                calibrator,
                control,
                next_sequence: AtomicU64::new(1),
                task: Mutex::new(Some(task)),
            }),
        }
    }
}

#[derive(Debug)]
struct Inner {
    queue: Arc<EventQueue>,
    model: Arc<LatencyModel>,
    stats: Arc<StatsAggregator>,
    calibrator: Calibrator,
    control: Arc<DispatchControl>,
    next_sequence: AtomicU64,
    task: Mutex<Option<JoinHandle<DispatchReport>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.control.request_stop();
    }
}

/// Cloneable handle to a running scheduler.
///
/// Dropping the last handle asks the dispatcher to stop.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    inner: Arc<Inner>,
}

impl SchedulerHandle {
    /// Hand a decoded trigger to the scheduler.
    ///
    /// Never blocks and never fails: when the queue is full the oldest pending
    /// event is dropped. A `receive_time` in the future is clamped to now.
    /// Returns the assigned sequence id.
    pub fn submit(&self, label: impl Into<String>, receive_time: Instant) -> u64 {
        let sequence_id = self.inner.next_sequence.fetch_add(1, Ordering::Relaxed);
        if self.inner.control.stop_requested() {
            trace!(sequence_id, "Scheduler stopping, event ignored");
            return sequence_id;
        }

        let now = Instant::now();
        let receive_time = if receive_time > now {
            debug!(
                sequence_id,
                ahead_ms = receive_time.saturating_duration_since(now).as_millis() as u64,
                "Receive time in the future, clamped to now"
            );
            now
        } else {
            receive_time
        };

        let event = Event::new(label, receive_time, sequence_id);
        if let Some(evicted) = self.inner.queue.push_evicting(event) {
            let err = SchedulerError::QueueOverflow {
                evicted_sequence: evicted.sequence_id(),
            };
            debug!(label = evicted.label(), "{err}");
        }
        sequence_id
    }

    /// [`submit`](Self::submit) stamped with the current instant.
    pub fn submit_now(&self, label: impl Into<String>) -> u64 {
        self.submit(label, Instant::now())
    }

    pub fn show_stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn adjust(&self, step: DelayStep) -> AdjustmentResult {
        self.inner.calibrator.manual_adjust(step)
    }

    pub fn auto_calibrate(&self) -> Result<AdjustmentResult, SchedulerError> {
        self.inner.calibrator.auto_calibrate()
    }

    /// Current latency model terms.
    pub fn latency(&self) -> LatencyParams {
        self.inner.model.current()
    }

    pub fn set_target_latency(&self, target: Duration) -> AdjustmentOutcome {
        let outcome = self.inner.model.set_target_latency(target);
        info!(
            target_ms = target.as_millis() as u64,
            delay_ms = outcome.current.as_millis() as u64,
            "Target latency changed"
        );
        outcome
    }

    pub fn state(&self) -> DispatcherState {
        self.inner.control.state()
    }

    pub fn is_running(&self) -> bool {
        !self.inner.control.stop_requested()
    }

    /// Stop the dispatcher and wait for it to release the actuator.
    ///
    /// Any in-flight actuation completes first. Returns
    /// [`SchedulerError::Stopped`] if the scheduler was already shut down.
    pub async fn shutdown(&self) -> Result<DispatchReport, SchedulerError> {
        self.inner.control.request_stop();
        let task = self.inner.task.lock().take();
        let Some(task) = task else {
            return Err(SchedulerError::Stopped);
        };

        match task.await {
            Ok(report) => Ok(report),
            Err(err) => {
                error!(error = %err, "Dispatcher task ended abnormally");
                Err(SchedulerError::Stopped)
            }
        }
    }

    /// Execute an operator command.
    pub async fn execute(&self, command: ControlCommand) -> ControlResponse {
        match command {
            ControlCommand::ShowStats => ControlResponse::Stats(self.show_stats()),
            ControlCommand::Adjust(step) => ControlResponse::Adjusted(self.adjust(step)),
            ControlCommand::AutoCalibrate => match self.auto_calibrate() {
                Ok(result) => ControlResponse::Adjusted(result),
                Err(err) => ControlResponse::Rejected(err),
            },
            ControlCommand::ShowDelay => ControlResponse::Delay(self.latency()),
            ControlCommand::Shutdown => match self.shutdown().await {
                Ok(report) => ControlResponse::Stopped(report),
                Err(err) => ControlResponse::Rejected(err),
            },
        }
    }
}
