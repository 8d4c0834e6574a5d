//! End-to-end timing scenarios on a paused tokio clock.

mod common;

use std::error::Error;
use std::time::Duration;

use common::{RecordingActuator, ms, submit_every, uniform_table};
use pulsesync_scheduler::{DelayStep, Event, EventQueue, Scheduler, SchedulerConfig};
use tokio::time::Instant;

type TestResult = Result<(), Box<dyn Error>>;

/// Actuation started within a small window after `expected`.
fn started_near(actual: Instant, expected: Instant) -> bool {
    actual >= expected && actual.saturating_duration_since(expected) < ms(2)
}

#[tokio::test(start_paused = true)]
async fn test_actuations_start_at_receive_plus_delay() -> TestResult {
    // 200 - 50 - 100 = 50ms intentional delay
    let config = SchedulerConfig::new()
        .with_target_latency(ms(200))
        .with_overheads(ms(50), ms(100));
    let actuator = RecordingActuator::default();
    let handle = Scheduler::new(config, uniform_table(ms(5))?).start(actuator.clone());

    let t = Instant::now();
    for (offset, label) in [(0, "a"), (10, "b"), (20, "c")] {
        tokio::time::sleep_until(t + ms(offset)).await;
        handle.submit(label, Instant::now());
    }
    tokio::time::sleep(ms(200)).await;

    let activations = actuator.activations();
    let starts: Vec<Instant> = activations.iter().map(|a| a.at).collect();
    let order: Vec<u8> = activations.iter().map(|a| a.brightness).collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert_eq!(starts.len(), 3);
    for (start, expected) in starts.iter().zip([50, 60, 70]) {
        assert!(
            started_near(*start, t + ms(expected)),
            "started {:?} after t, expected {expected}ms",
            start.saturating_duration_since(t)
        );
    }

    let samples = handle.show_stats();
    assert_eq!(samples.count, 3);
    assert!(samples.mean >= ms(50) && samples.mean < ms(52));

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_overload_backlog_grows_latency() -> TestResult {
    // Zero overheads: delay equals the 250ms target.
    let config = SchedulerConfig::new()
        .with_target_latency(ms(250))
        .with_overheads(Duration::ZERO, Duration::ZERO)
        .with_max_queue_size(16);
    let actuator = RecordingActuator::default();
    let scheduler = Scheduler::new(config, uniform_table(ms(80))?);
    let handle = scheduler.start(actuator.clone());

    // 10 events, 20ms apart, each pulse holding for 80ms.
    submit_every(&handle, "a", 10, ms(20)).await;
    tokio::time::sleep(ms(2000)).await;

    let stats = handle.show_stats();
    assert_eq!(stats.count, 10);
    assert_eq!(stats.dropped_events, 0);
    assert_eq!(stats.early_count, 0);
    assert!(stats.late_count >= 9);
    // latency of event k is 250 + 60k ms once the backlog builds
    assert!(stats.max >= ms(250) + ms(9 * 60), "max latency {:?}", stats.max);

    let report = handle.shutdown().await?;
    assert_eq!(report.dispatched, 10);
    Ok(())
}

#[test]
fn test_overflow_keeps_newest_two() {
    let queue = EventQueue::with_capacity(2);
    let now = Instant::now();
    let evictions: Vec<bool> = (1..=3)
        .map(|seq| queue.push(Event::new("a", now, seq)))
        .collect();

    assert_eq!(evictions, vec![false, false, true]);
    assert_eq!(queue.overflow_count(), 1);
    let kept: Vec<u64> = std::iter::from_fn(|| queue.try_pop())
        .map(|e| e.sequence_id())
        .collect();
    assert_eq!(kept, vec![2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_calibration_brings_latency_onto_target() -> TestResult {
    // Default model: target 250, delay 100, so every event lands 150ms early.
    let actuator = RecordingActuator::default();
    let handle = Scheduler::new(SchedulerConfig::default(), uniform_table(ms(1))?)
        .start(actuator.clone());

    submit_every(&handle, "b", 20, ms(10)).await;
    tokio::time::sleep(ms(500)).await;

    let before = handle.show_stats();
    assert_eq!(before.count, 20);
    assert_eq!(before.early_count, 20);

    let result = handle.auto_calibrate()?;
    assert_eq!(result.previous_delay(), ms(100));
    assert_eq!(result.new_delay(), ms(250));
    assert_eq!(handle.show_stats().count, 0);

    submit_every(&handle, "b", 10, ms(10)).await;
    tokio::time::sleep(ms(600)).await;

    let after = handle.show_stats();
    assert_eq!(after.count, 10);
    assert_eq!(after.early_count, 0);
    assert_eq!(after.late_count, 0);
    assert!(after.mean >= ms(250) && after.mean < ms(252));

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_adjustment_applies_to_next_event() -> TestResult {
    let actuator = RecordingActuator::default();
    let handle = Scheduler::new(SchedulerConfig::default(), uniform_table(ms(1))?)
        .start(actuator.clone());

    let t = Instant::now();
    handle.submit("a", t);
    tokio::time::sleep(ms(150)).await;

    handle.adjust(DelayStep::IncreaseLarge);
    let t2 = Instant::now();
    handle.submit("a", t2);
    tokio::time::sleep(ms(300)).await;

    let starts: Vec<Instant> = actuator.activations().iter().map(|a| a.at).collect();
    assert_eq!(starts.len(), 2);
    assert!(starts.first().is_some_and(|s| started_near(*s, t + ms(100))));
    assert!(starts.get(1).is_some_and(|s| started_near(*s, t2 + ms(150))));

    let samples = handle.show_stats();
    assert_eq!(samples.count, 2);
    // 100ms and 150ms both land well before the 250ms target
    assert_eq!(samples.early_count, 2);

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failures_do_not_stop_dispatch() -> TestResult {
    let actuator = RecordingActuator::default();
    actuator.set_failing(true);
    let handle = Scheduler::new(SchedulerConfig::default(), uniform_table(ms(1))?)
        .start(actuator.clone());

    submit_every(&handle, "c", 3, ms(10)).await;
    tokio::time::sleep(ms(300)).await;

    let stats = handle.show_stats();
    assert_eq!(stats.count, 3);
    assert_eq!(stats.failed_actuations, 3);
    assert_eq!(stats.early_count, 3);

    let report = handle.shutdown().await?;
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.failed, 3);
    // one off per attempt plus the release at shutdown
    assert_eq!(actuator.off_count(), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sample_classes_follow_error_band() -> TestResult {
    // delay 248ms against a 250ms target: within the ±5ms band
    let config = SchedulerConfig::new().with_overheads(ms(2), Duration::ZERO);
    let handle =
        Scheduler::new(config, uniform_table(ms(1))?).start(RecordingActuator::default());

    handle.submit_now("a");
    tokio::time::sleep(ms(400)).await;

    let stats = handle.show_stats();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.early_count + stats.late_count, 0);
    assert!(stats.mean_error_ms() < 0.0);

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_future_receive_time_does_not_stall_dispatch() -> TestResult {
    let actuator = RecordingActuator::default();
    let handle = Scheduler::new(SchedulerConfig::default(), uniform_table(ms(1))?)
        .start(actuator.clone());

    let now = Instant::now();
    handle.submit("a", now + Duration::from_secs(3600));
    handle.submit_now("b");
    tokio::time::sleep(ms(500)).await;

    // the bogus stamp is treated as "received now"
    let activations = actuator.activations();
    assert_eq!(activations.len(), 2);
    assert!(activations.iter().all(|a| started_near(a.at, now + ms(100))));

    let report = tokio::time::timeout(Duration::from_secs(5), handle.shutdown()).await??;
    assert_eq!(report.dispatched, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_does_not_wait_for_pending_deadline() -> TestResult {
    // a one-second delay leaves the event waiting when shutdown arrives
    let config = SchedulerConfig::new()
        .with_target_latency(ms(1150))
        .with_delay_bounds(ms(1), ms(1000));
    let actuator = RecordingActuator::default();
    let handle = Scheduler::new(config, uniform_table(ms(1))?).start(actuator.clone());

    handle.submit_now("a");
    handle.submit_now("b");
    tokio::time::sleep(ms(10)).await;

    let started = Instant::now();
    let report = tokio::time::timeout(ms(100), handle.shutdown()).await??;
    assert!(started.elapsed() < ms(10));
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.discarded, 2);
    assert!(actuator.activations().is_empty());
    // released to off anyway
    assert_eq!(actuator.off_count(), 1);
    Ok(())
}
