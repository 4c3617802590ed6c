//! Notification bridge integration tests.
//!
//! Messages emitted before a transport exists are buffered and flushed in
//! order; task code on worker threads reaches the sink through its context.

use cadence::{CommandTask, Dispatch, Job, Notifier, Scheduler, TaskArgs, Trigger, from_fn};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{RecordingSink, wait_until};

/// Test: buffered messages are delivered in emission order on attach.
#[tokio::test]
async fn test_pending_messages_flush_in_order() {
    let notifier = Notifier::new();
    assert_eq!(notifier.notify("first"), Dispatch::Buffered);
    assert_eq!(notifier.notify("second"), Dispatch::Buffered);

    let sink = RecordingSink::new();
    notifier.attach(sink.clone()).unwrap();
    assert_eq!(notifier.notify("third"), Dispatch::Queued);

    wait_until(Duration::from_secs(1), || sink.messages().len() == 3).await;
    assert_eq!(sink.messages(), vec!["first", "second", "third"]);
}

/// Test: lifecycle messages of a scheduled run emitted before attach are kept.
#[tokio::test]
async fn test_scheduler_messages_before_attach() {
    let mut scheduler = Scheduler::new();
    scheduler.register(Job::new(
        "main_task",
        Trigger::parse("*/5 * * * *").unwrap(),
        from_fn(|_| Ok(json!(null))),
    ));
    let notifier = scheduler.notifier().clone();
    let (handle, join) = scheduler.start().await;
    handle.trigger("main_task").await.unwrap();

    let sink = RecordingSink::new();
    wait_until(Duration::from_secs(2), || {
        notifier
            .pending()
            .iter()
            .any(|m| m.contains("completed"))
    })
    .await;
    notifier.attach(sink.clone()).unwrap();

    wait_until(Duration::from_secs(1), || {
        sink.count_containing("Task 'main_task' completed") == 1
    })
    .await;
    let messages = sink.messages();
    let started = messages
        .iter()
        .position(|m| m == "Task 'main_task' started")
        .unwrap();
    let completed = messages
        .iter()
        .position(|m| m.starts_with("Task 'main_task' completed in"))
        .unwrap();
    assert!(started < completed);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

/// Test: task code on a worker thread emits progress through its context.
#[tokio::test]
async fn test_task_progress_from_worker_thread() {
    let sink = RecordingSink::new();
    let scheduler = Scheduler::new();
    scheduler.notifier().attach(sink.clone()).unwrap();
    let (handle, join) = scheduler.start().await;

    handle
        .start_manual_task(
            "import",
            from_fn(|ctx| {
                for step in 1..=3 {
                    ctx.notify(format!("{}: step {step}/3", ctx.name()));
                }
                Ok(json!(null))
            }),
            TaskArgs::new(),
        )
        .unwrap();

    wait_until(Duration::from_secs(2), || {
        sink.count_containing("Manual task 'import' completed") == 1
    })
    .await;
    let steps: Vec<String> = sink
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("import: step"))
        .collect();
    assert_eq!(steps, vec!["import: step 1/3", "import: step 2/3", "import: step 3/3"]);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

/// Test: `notify:` lines printed by a command task reach the sink.
#[cfg(unix)]
#[tokio::test]
async fn test_command_task_notify_lines() {
    let sink = RecordingSink::new();
    let scheduler = Scheduler::new();
    scheduler.notifier().attach(sink.clone()).unwrap();
    let (handle, join) = scheduler.start().await;

    let task = CommandTask::builder("sh")
        .arg("-c")
        .arg("echo 'notify:saved {file_path}'; echo plain output")
        .build();
    handle
        .start_manual_task(
            "save",
            Arc::new(task),
            TaskArgs::new().with("file_path", "/tmp/state.json"),
        )
        .unwrap();

    sink.wait_for("saved /tmp/state.json", Duration::from_secs(5)).await;
    wait_until(Duration::from_secs(5), || {
        sink.count_containing("Manual task 'save' completed") == 1
    })
    .await;
    assert_eq!(sink.count_containing("plain output"), 0);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}
