//! Scheduled run integration tests.
//!
//! Jobs fire from their trigger or on request, run under the timeout guard
//! and never overlap with themselves.

use cadence::{Job, JobId, Scheduler, TaskArgs, TaskError, Trigger, from_fn};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::common::{RecordingSink, cooperative_task, stubborn_task, wait_until};

/// Test: a run exceeding its timeout is abandoned and reported once.
#[tokio::test]
async fn test_timed_out_run_is_released_and_notified_once() {
    let sink = RecordingSink::new();
    let mut scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(50));
    scheduler.register(
        Job::new(
            "J",
            Trigger::parse("@yearly").unwrap(),
            stubborn_task(Duration::from_secs(5)),
        )
        .with_timeout(Duration::from_secs(2)),
    );
    scheduler.notifier().attach(sink.clone()).unwrap();
    let (handle, join) = scheduler.start().await;

    handle.trigger("J").await.unwrap();
    assert!(handle.snapshot().await.scheduled_running.contains(&JobId::new("J")));

    tokio::time::sleep(Duration::from_secs(3)).await;

    let view = handle.snapshot().await;
    assert!(!view.scheduled_running.contains(&JobId::new("J")));
    sink.wait_for("timed out", Duration::from_secs(1)).await;
    assert_eq!(sink.count_containing("Task 'J' timed out after 2s"), 1);
    assert_eq!(sink.count_containing("Task 'J' completed"), 0);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

/// Test: an interval trigger keeps firing and a run never overlaps itself.
#[tokio::test]
async fn test_interval_job_never_overlaps() {
    let live = Arc::new(AtomicUsize::new(0));
    let max_live = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    let task = {
        let live = Arc::clone(&live);
        let max_live = Arc::clone(&max_live);
        let runs = Arc::clone(&runs);
        from_fn(move |_| {
            let now = live.fetch_add(1, Ordering::SeqCst) + 1;
            max_live.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(150));
            live.fetch_sub(1, Ordering::SeqCst);
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(json!(null))
        })
    };

    let mut scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(20));
    scheduler.register(Job::new(
        "ticker",
        Trigger::every(Duration::from_millis(40)).unwrap(),
        task,
    ));
    let (handle, join) = scheduler.start().await;

    wait_until(Duration::from_secs(5), || runs.load(Ordering::SeqCst) >= 3).await;
    assert_eq!(max_live.load(Ordering::SeqCst), 1);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

/// Test: triggering a job that is already running is refused.
#[tokio::test]
async fn test_trigger_while_running_is_refused() {
    let mut scheduler = Scheduler::new();
    scheduler.register(Job::new(
        "slow",
        Trigger::parse("@yearly").unwrap(),
        cooperative_task(Duration::from_secs(5)),
    ));
    let (handle, join) = scheduler.start().await;

    let first = handle.trigger("slow").await.unwrap();
    let err = handle.trigger("slow").await.unwrap_err();
    assert!(matches!(err, cadence::SchedulerError::AlreadyRunning(id) if id == "slow"));

    let record = handle.scheduled_record(&JobId::new("slow")).unwrap();
    assert_eq!(record.run_id, first);

    let report = handle.shutdown().await.unwrap();
    assert_eq!(report.abandoned, vec![JobId::new("slow")]);
    join.await.unwrap();
}

/// Test: a failing job does not stop the trigger loop.
#[tokio::test]
async fn test_failing_job_keeps_loop_alive() {
    let sink = RecordingSink::new();
    let healthy_runs = Arc::new(AtomicUsize::new(0));

    let mut scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(20));
    scheduler.register(Job::new(
        "broken",
        Trigger::every(Duration::from_millis(50)).unwrap(),
        from_fn(|_| Err(TaskError::ExecutionFailed("disk full".into()))),
    ));
    scheduler.register(Job::new(
        "panicky",
        Trigger::every(Duration::from_millis(50)).unwrap(),
        from_fn(|_| panic!("boom")),
    ));
    scheduler.register(Job::new("healthy", Trigger::every(Duration::from_millis(50)).unwrap(), {
        let healthy_runs = Arc::clone(&healthy_runs);
        from_fn(move |_| {
            healthy_runs.fetch_add(1, Ordering::SeqCst);
            Ok(json!(null))
        })
    }));
    scheduler.notifier().attach(sink.clone()).unwrap();
    let (handle, join) = scheduler.start().await;

    wait_until(Duration::from_secs(5), || {
        sink.count_containing("Task 'broken' failed") >= 2
            && sink.count_containing("Task 'panicky' failed") >= 2
            && healthy_runs.load(Ordering::SeqCst) >= 2
    })
    .await;
    assert!(handle.is_running().await);
    assert!(sink.count_containing("boom") >= 1);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

/// Test: paused scheduler skips triggers but still accepts manual triggers.
#[tokio::test]
async fn test_pause_and_resume() {
    let runs = Arc::new(AtomicUsize::new(0));
    let task = {
        let runs = Arc::clone(&runs);
        from_fn(move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(json!(null))
        })
    };

    let mut scheduler = Scheduler::new().with_tick_interval(Duration::from_millis(20));
    scheduler.register(Job::new(
        "interval",
        Trigger::every(Duration::from_millis(50)).unwrap(),
        task,
    ));
    let (handle, join) = scheduler.start().await;

    handle.pause().await.unwrap();
    assert!(handle.is_paused().await);
    let paused_at = runs.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    // At most one run that was already in flight when the pause landed.
    assert!(runs.load(Ordering::SeqCst) <= paused_at + 1);

    let before_trigger = runs.load(Ordering::SeqCst);
    handle.trigger("interval").await.unwrap();
    wait_until(Duration::from_secs(2), || {
        runs.load(Ordering::SeqCst) > before_trigger
    })
    .await;

    handle.resume().await.unwrap();
    let resumed_at = runs.load(Ordering::SeqCst);
    wait_until(Duration::from_secs(2), || {
        runs.load(Ordering::SeqCst) >= resumed_at + 2
    })
    .await;

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

/// Test: registering, replacing and removing jobs at runtime.
#[tokio::test]
async fn test_runtime_registration() {
    let (handle, join) = Scheduler::new().start().await;
    assert!(handle.jobs().await.is_empty());

    handle
        .register_task(
            "nightly",
            from_fn(|ctx| Ok(json!(ctx.args().text("mode")))),
            Duration::from_secs(30),
            "0 3 * * *",
            TaskArgs::new().with("mode", "full"),
        )
        .await
        .unwrap();

    let jobs = handle.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, JobId::new("nightly"));
    assert_eq!(jobs[0].schedule, "0 3 * * *");
    assert_eq!(jobs[0].timeout_secs, 30);
    assert!(jobs[0].next_run.is_some());

    let err = handle
        .register_task(
            "broken",
            from_fn(|_| Ok(json!(null))),
            Duration::from_secs(1),
            "every tuesday",
            TaskArgs::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, cadence::SchedulerError::Trigger(_)));
    assert_eq!(handle.jobs().await.len(), 1);

    assert!(handle.unregister(&JobId::new("nightly")).await);
    assert!(!handle.unregister(&JobId::new("nightly")).await);
    assert!(handle.jobs().await.is_empty());

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}
