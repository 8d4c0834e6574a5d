//! Daemon lifecycle: assemble the scheduler, feed it, report, shut down.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pulsesync_errors::{PulseSyncError, ResultExt, error_context};
use pulsesync_scheduler::{DispatchReport, Scheduler, SchedulerHandle, StatsSnapshot};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::demo::DrumPattern;
use crate::simulated::{BulbCounters, SimulatedBulb};

/// Outcome of a daemon run.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonReport {
    pub dispatch: DispatchReport,
    /// Triggers produced by the demo pattern
    pub demo_submitted: u64,
    pub final_stats: StatsSnapshot,
}

/// Running configuration of the daemon.
pub struct PulseDaemon {
    config: ServiceConfig,
    handle: SchedulerHandle,
    bulb: Arc<BulbCounters>,
    shutdown_tx: broadcast::Sender<()>,
}

impl PulseDaemon {
    /// Validate the configuration and start the scheduler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: ServiceConfig) -> Result<Self, PulseSyncError> {
        Self::assemble(config).inspect_err(|err| {
            error!(
                category = %err.category(),
                severity = %err.severity(),
                error = %err,
                "Daemon failed to start"
            );
        })
    }

    fn assemble(config: ServiceConfig) -> Result<Self, PulseSyncError> {
        config.validate()?;
        let table = config.actuation_table()?;

        let bulb = SimulatedBulb::with_config(config.bulb_address.clone(), &config.simulation);
        let counters = bulb.counters();
        let handle = Scheduler::new(config.scheduler.clone(), table).start(bulb);
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(bulb = %config.bulb_address, "Daemon started");
        Ok(Self {
            config,
            handle,
            bulb: counters,
            shutdown_tx,
        })
    }

    /// Handle for submitting triggers and operator commands.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn bulb_counters(&self) -> Arc<BulbCounters> {
        Arc::clone(&self.bulb)
    }

    /// Run until `shutdown` resolves, then stop the scheduler.
    pub async fn run<F>(self, shutdown: F) -> Result<DaemonReport, PulseSyncError>
    where
        F: Future<Output = ()>,
    {
        let demo = match &self.config.demo {
            Some(demo) => {
                let pattern = DrumPattern::from_config(demo)?;
                Some(tokio::spawn(
                    pattern.play(self.handle.clone(), self.shutdown_tx.subscribe()),
                ))
            }
            None => None,
        };

        let reporter = (self.config.stats_interval_secs > 0).then(|| {
            tokio::spawn(report_stats(
                self.handle.clone(),
                Duration::from_secs(self.config.stats_interval_secs),
                self.shutdown_tx.subscribe(),
            ))
        });

        shutdown.await;
        info!("Shutdown requested");
        if self.shutdown_tx.send(()).is_err() {
            debug!("No background tasks to stop");
        }

        let mut demo_submitted = 0;
        if let Some(task) = demo {
            match task.await {
                Ok(count) => demo_submitted = count,
                Err(err) => warn!(error = %err, "Demo task ended abnormally"),
            }
        }
        if let Some(task) = reporter {
            if let Err(err) = task.await {
                warn!(error = %err, "Stats task ended abnormally");
            }
        }

        let dispatch = self
            .handle
            .shutdown()
            .await
            .context(error_context!(
                "stopping scheduler",
                "bulb" => self.config.bulb_address.as_str()
            ))?;
        let final_stats = self.handle.show_stats();
        info!(
            dispatched = dispatch.dispatched,
            failed = dispatch.failed,
            stats = %final_stats,
            "Daemon stopped"
        );

        Ok(DaemonReport {
            dispatch,
            demo_submitted,
            final_stats,
        })
    }
}

async fn report_stats(
    handle: SchedulerHandle,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let stats = handle.show_stats();
                let delay = handle.latency().intentional_delay;
                info!(
                    delay_ms = delay.as_millis() as u64,
                    dropped = stats.dropped_events,
                    "{stats}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DemoConfig, SimulationConfig};
    use tracing_test::traced_test;

    fn quiet_config() -> ServiceConfig {
        ServiceConfig {
            simulation: SimulationConfig {
                command_latency_ms: 0,
                fail_every: 0,
                ..SimulationConfig::default()
            },
            stats_interval_secs: 0,
            ..ServiceConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_run_without_sources_stops_cleanly() -> Result<(), PulseSyncError> {
        let daemon = PulseDaemon::start(quiet_config())?;
        let counters = daemon.bulb_counters();

        let report = daemon
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await?;

        assert_eq!(report.dispatch.dispatched, 0);
        assert_eq!(report.demo_submitted, 0);
        // released to off at shutdown
        assert_eq!(counters.snapshot().offs, 1);
        assert!(logs_contain("Daemon stopped"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_submissions_are_dispatched() -> Result<(), PulseSyncError> {
        let daemon = PulseDaemon::start(quiet_config())?;
        let handle = daemon.handle();
        handle.submit_now("bd");
        handle.submit_now("unknown");

        let report = daemon
            .run(tokio::time::sleep(Duration::from_millis(500)))
            .await?;
        assert_eq!(report.dispatch.dispatched, 2);
        assert_eq!(report.final_stats.count, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_invalid_demo_rejected_at_start() {
        let config = ServiceConfig {
            demo: Some(DemoConfig {
                bpm: 9000,
                ..DemoConfig::default()
            }),
            ..quiet_config()
        };
        assert!(matches!(
            PulseDaemon::start(config),
            Err(PulseSyncError::Config(_))
        ));
        assert!(logs_contain("Daemon failed to start"));
        assert!(logs_contain("category=Config"));
    }
}
