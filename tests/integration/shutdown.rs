//! Shutdown integration tests.
//!
//! Shutdown stops manual tasks within the grace period, abandons scheduled
//! runs, refuses new work and stays bounded by the shutdown timeout.

use cadence::{
    Job, JobId, LaunchError, Scheduler, SchedulerError, SchedulerState, StopOutcome, TaskArgs,
    Trigger,
};
use std::time::{Duration, Instant};

use crate::common::{RecordingSink, cooperative_task, stubborn_task};

/// Test: cooperative manual tasks stop and are reported in name order.
#[tokio::test]
async fn test_shutdown_stops_manual_tasks() {
    let sink = RecordingSink::new();
    let scheduler = Scheduler::new();
    scheduler.notifier().attach(sink.clone()).unwrap();
    let (handle, join) = scheduler.start().await;

    for name in ["beta", "alpha"] {
        handle
            .start_manual_task(name, cooperative_task(Duration::from_secs(10)), TaskArgs::new())
            .unwrap();
    }

    let started = Instant::now();
    let report = handle.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(
        report.manual,
        vec![
            ("alpha".to_string(), StopOutcome::Stopped),
            ("beta".to_string(), StopOutcome::Stopped),
        ]
    );
    assert!(!report.timed_out);
    assert!(report.abandoned.is_empty());

    join.await.unwrap();
    assert_eq!(handle.state().await, SchedulerState::Stopped);
    sink.wait_for("Scheduler stopped", Duration::from_secs(1)).await;
    assert_eq!(sink.count_containing("2 manual task(s) stopped"), 1);
}

/// Test: an unresponsive manual task is reported without blocking shutdown.
#[tokio::test]
async fn test_shutdown_reports_unresponsive_task() {
    let scheduler = Scheduler::new()
        .with_stop_grace(Duration::from_millis(200))
        .with_shutdown_timeout(Duration::from_secs(5));
    let (handle, join) = scheduler.start().await;

    handle
        .start_manual_task("stuck", stubborn_task(Duration::from_secs(2)), TaskArgs::new())
        .unwrap();

    let started = Instant::now();
    let report = handle.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        report.manual,
        vec![("stuck".to_string(), StopOutcome::ForcedStopRequired)]
    );

    join.await.unwrap();
}

/// Test: shutdown timeout bounds the wait even with a long stop grace.
#[tokio::test]
async fn test_shutdown_timeout_bounds_grace() {
    let scheduler = Scheduler::new()
        .with_stop_grace(Duration::from_secs(30))
        .with_shutdown_timeout(Duration::from_millis(300));
    let (handle, join) = scheduler.start().await;

    handle
        .start_manual_task("stuck", stubborn_task(Duration::from_secs(2)), TaskArgs::new())
        .unwrap();

    let started = Instant::now();
    let report = handle.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(report.manual.iter().all(|(_, outcome)| !outcome.is_success()) || report.timed_out);

    join.await.unwrap();
}

/// Test: scheduled runs in flight are abandoned at shutdown.
#[tokio::test]
async fn test_shutdown_abandons_scheduled_runs() {
    let mut scheduler = Scheduler::new();
    scheduler.register(Job::new(
        "long",
        Trigger::parse("@yearly").unwrap(),
        cooperative_task(Duration::from_secs(10)),
    ));
    let (handle, join) = scheduler.start().await;

    handle.trigger("long").await.unwrap();
    let report = handle.shutdown().await.unwrap();
    assert_eq!(report.abandoned, vec![JobId::new("long")]);
    assert!(handle.scheduled_record(&JobId::new("long")).is_none());

    join.await.unwrap();
}

/// Test: no new work is accepted after shutdown and a second shutdown is a no-op.
#[tokio::test]
async fn test_no_work_after_shutdown() {
    let mut scheduler = Scheduler::new();
    scheduler.register(Job::new(
        "job",
        Trigger::parse("@hourly").unwrap(),
        cooperative_task(Duration::from_millis(10)),
    ));
    let (handle, join) = scheduler.start().await;
    handle.shutdown().await.unwrap();
    join.await.unwrap();

    let err = handle
        .start_manual_task("late", cooperative_task(Duration::from_millis(10)), TaskArgs::new())
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Launch(LaunchError::SchedulerStopped)
    ));
    assert!(handle.trigger("job").await.is_err());
    assert!(matches!(
        handle
            .register(Job::new(
                "other",
                Trigger::parse("@daily").unwrap(),
                cooperative_task(Duration::from_millis(10)),
            ))
            .await,
        Err(SchedulerError::Stopped)
    ));

    let again = handle.shutdown().await.unwrap();
    assert!(again.manual.is_empty());
    assert!(again.abandoned.is_empty());
}
