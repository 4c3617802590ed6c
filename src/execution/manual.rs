//! Manual task launcher.
//!
//! Each manual task runs on its own OS thread, named `manual-<name>`, outside
//! the scheduled worker pool. At most one live execution exists per name.
//! Stopping is cooperative: the launcher sets the task's stop signal and polls
//! the thread for a bounded grace period. A thread still alive when the grace
//! elapses is marked `Unresponsive` and stays tracked.

use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::panic_message;
use super::record::{ExecutionRecord, ExecutionStatus};
use crate::core::lock;
use crate::core::stop::StopSignal;
use crate::core::task::{ExecutionKind, Task, TaskArgs, TaskContext, TaskError};
use crate::core::types::RunId;
use crate::notify::Notifier;

/// Default time a stopped task gets to return.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);

/// Poll interval while waiting for a stopped thread.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors launching a manual task.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A live execution already uses this name.
    #[error("manual task '{0}' is already running")]
    AlreadyRunning(String),

    /// The OS refused to create the thread.
    #[error("failed to spawn thread for manual task '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The launcher no longer accepts work.
    #[error("scheduler is stopped")]
    SchedulerStopped,
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Nothing was registered under the name.
    NotRunning,
    /// The task had already returned; its record was reaped.
    AlreadyFinished,
    /// The task returned within the grace period.
    Stopped,
    /// The grace period elapsed with the thread still alive.
    ForcedStopRequired,
}

impl StopOutcome {
    /// Only a task that ignored its stop signal counts as a failure.
    pub fn is_success(&self) -> bool {
        !matches!(self, StopOutcome::ForcedStopRequired)
    }
}

#[derive(Debug)]
struct ManualEntry {
    run_id: RunId,
    record: Arc<Mutex<ExecutionRecord>>,
    stop: StopSignal,
    thread: JoinHandle<()>,
}

#[derive(Debug)]
struct Inner {
    entries: Mutex<HashMap<String, ManualEntry>>,
    notifier: Notifier,
    stop_grace: Duration,
    closed: AtomicBool,
}

/// Registry and launcher for manual tasks. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ManualTasks {
    inner: Arc<Inner>,
}

impl ManualTasks {
    pub fn new(notifier: Notifier, stop_grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                notifier,
                stop_grace,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Grace period used by [`stop`](Self::stop) and [`stop_all`](Self::stop_all).
    pub fn stop_grace(&self) -> Duration {
        self.inner.stop_grace
    }

    /// Refuse further launches.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Launch `task` on a dedicated thread under `name`.
    pub fn start(
        &self,
        name: impl Into<String>,
        task: Arc<dyn Task>,
        args: TaskArgs,
    ) -> Result<RunId, LaunchError> {
        let name = name.into();
        if self.is_closed() {
            return Err(LaunchError::SchedulerStopped);
        }
        let notifier = &self.inner.notifier;

        let mut entries = lock(&self.inner.entries);
        if let Some(entry) = entries.get(&name) {
            if !entry.thread.is_finished() {
                warn!(task = %name, "manual task already running, refusing launch");
                notifier.notify(format!("Manual task '{name}' is already running"));
                return Err(LaunchError::AlreadyRunning(name));
            }
            entries.remove(&name);
            debug!(task = %name, "reaped finished manual task before relaunch");
        }

        let record = ExecutionRecord::start(&name, ExecutionKind::Manual, args.clone());
        let run_id = record.run_id;
        let record = Arc::new(Mutex::new(record));
        let stop = StopSignal::new(&name);
        let ctx = TaskContext::new(
            &name,
            ExecutionKind::Manual,
            args,
            stop.clone(),
            notifier.clone(),
        );

        // The thread takes the record lock before running the task, so every
        // message it emits follows "started".
        let announced = lock(&record);
        let spawned = thread::Builder::new().name(format!("manual-{name}")).spawn({
            let record = Arc::clone(&record);
            let notifier = notifier.clone();
            move || run_manual(task, ctx, record, notifier)
        });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(source) => {
                error!(task = %name, error = %source, "failed to spawn manual task thread");
                notifier.notify(format!("Manual task '{name}' failed to start: {source}"));
                return Err(LaunchError::Spawn { name, source });
            }
        };
        notifier.notify(format!("Manual task '{name}' started"));
        drop(announced);

        info!(task = %name, run_id = %run_id, "manual task started");
        entries.insert(
            name,
            ManualEntry {
                run_id,
                record,
                stop,
                thread,
            },
        );
        Ok(run_id)
    }

    /// Copy of the record registered under `name`.
    ///
    /// A record whose thread has ended is returned one last time and reaped.
    pub fn lookup(&self, name: &str) -> Option<ExecutionRecord> {
        let mut entries = lock(&self.inner.entries);
        let entry = entries.get(name)?;
        let record = lock(&entry.record).clone();
        if entry.thread.is_finished() {
            entries.remove(name);
        }
        Some(record)
    }

    /// Stop `name` using the default grace period.
    pub async fn stop(&self, name: &str) -> StopOutcome {
        self.stop_with_grace(name, self.inner.stop_grace).await
    }

    /// Request a stop and wait up to `grace` for the thread to end.
    pub async fn stop_with_grace(&self, name: &str, grace: Duration) -> StopOutcome {
        let notifier = &self.inner.notifier;

        let (run_id, record, owner) = {
            let mut entries = lock(&self.inner.entries);
            let Some(entry) = entries.get(name) else {
                debug!(task = %name, "stop requested for unknown manual task");
                return StopOutcome::NotRunning;
            };
            if entry.thread.is_finished() {
                entries.remove(name);
                debug!(task = %name, "stop requested for finished manual task");
                return StopOutcome::AlreadyFinished;
            }

            let mut record = lock(&entry.record);
            let owner = matches!(
                record.status,
                ExecutionStatus::Running | ExecutionStatus::Unresponsive
            );
            if owner {
                record.mark_stopping();
                // Sent under the record lock so it precedes the thread's own outcome.
                info!(task = %name, grace_secs = grace.as_secs_f64(), "stopping manual task");
                notifier.notify(format!("Stopping manual task '{name}'"));
            }
            entry.stop.request_stop();
            (entry.run_id, Arc::clone(&entry.record), owner)
        };

        // A grace too large to express as an instant has no deadline.
        let deadline = Instant::now().checked_add(grace);
        loop {
            if self.reap_if_finished(name, run_id) {
                // A task that failed while stopping has already reported it.
                let failed = lock(&record).status == ExecutionStatus::Failed;
                if owner && !failed {
                    info!(task = %name, "manual task stopped");
                    notifier.notify(format!("Manual task '{name}' stopped"));
                }
                return StopOutcome::Stopped;
            }
            let pause = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    STOP_POLL_INTERVAL.min(remaining)
                }
                None => STOP_POLL_INTERVAL,
            };
            tokio::time::sleep(pause).await;
        }

        {
            let entries = lock(&self.inner.entries);
            if let Some(entry) = entries.get(name).filter(|entry| entry.run_id == run_id) {
                lock(&entry.record).mark_unresponsive();
            }
        }
        if owner {
            warn!(task = %name, grace_secs = grace.as_secs_f64(), "manual task ignored stop request");
            notifier.notify(format!(
                "Manual task '{name}' did not stop within {}s, forced stop required",
                grace.as_secs()
            ));
        }
        StopOutcome::ForcedStopRequired
    }

    /// Stop every registered task concurrently with the default grace.
    pub async fn stop_all(&self) -> Vec<(String, StopOutcome)> {
        self.stop_all_within(self.inner.stop_grace).await
    }

    /// Stop every registered task concurrently, each within `grace`.
    ///
    /// Results are sorted by task name.
    pub async fn stop_all_within(&self, grace: Duration) -> Vec<(String, StopOutcome)> {
        let names: Vec<String> = lock(&self.inner.entries).keys().cloned().collect();

        let mut stops = JoinSet::new();
        for name in names {
            let tasks = self.clone();
            stops.spawn(async move {
                let outcome = tasks.stop_with_grace(&name, grace).await;
                (name, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "stop task did not complete"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Names of live tasks that are not marked unresponsive, sorted.
    pub fn running_names(&self) -> Vec<String> {
        self.names_where(|status| status != ExecutionStatus::Unresponsive)
    }

    /// Names of live tasks that ignored a stop request, sorted.
    pub fn unresponsive_names(&self) -> Vec<String> {
        self.names_where(|status| status == ExecutionStatus::Unresponsive)
    }

    fn names_where(&self, keep: impl Fn(ExecutionStatus) -> bool) -> Vec<String> {
        let mut entries = lock(&self.inner.entries);
        entries.retain(|_, entry| !entry.thread.is_finished());
        let mut names: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| keep(lock(&entry.record).status))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Whether the run is over; removes its entry if so.
    fn reap_if_finished(&self, name: &str, run_id: RunId) -> bool {
        let mut entries = lock(&self.inner.entries);
        match entries.get(name) {
            Some(entry) if entry.run_id == run_id => {
                if entry.thread.is_finished() {
                    entries.remove(name);
                    true
                } else {
                    false
                }
            }
            // Reaped by someone else, or replaced by a newer run.
            _ => true,
        }
    }
}

fn run_manual(
    task: Arc<dyn Task>,
    ctx: TaskContext,
    record: Arc<Mutex<ExecutionRecord>>,
    notifier: Notifier,
) {
    let name = ctx.name().to_string();
    drop(lock(&record));
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| task.execute(&ctx)))
        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))));
    let elapsed = started.elapsed();

    let message = {
        let mut record = lock(&record);
        let forced = record.status == ExecutionStatus::Unresponsive;
        let stop_requested = ctx.should_stop();
        let message = match result {
            Err(TaskError::Stopped) => {
                record.mark_stopped(elapsed);
                info!(task = %name, "manual task honoured stop request");
                None
            }
            Ok(output) => {
                record.mark_completed(output, elapsed);
                info!(task = %name, elapsed_ms = elapsed.as_millis(), "manual task completed");
                Some(format!(
                    "Manual task '{name}' completed in {:.2}s",
                    elapsed.as_secs_f64()
                ))
            }
            Err(e) => {
                error!(task = %name, error = %e, "manual task failed");
                let message = format!("Manual task '{name}' failed: {e}");
                record.mark_failed(e.to_string(), elapsed);
                Some(message)
            }
        };
        if forced {
            Some(format!("Manual task '{name}' finished after a forced stop was requested"))
        } else if stop_requested && record.status != ExecutionStatus::Failed {
            // The stop caller reports the outcome.
            None
        } else {
            message
        }
    };

    if let Some(message) = message {
        notifier.notify(message);
    }
}
