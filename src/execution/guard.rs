//! Bounded worker pool with per-run timeout enforcement.
//!
//! Scheduled task functions run on tokio's blocking threads, at most
//! `pool_size` at a time. A run holds its pool permit until the task function
//! returns, even after the guard has given up waiting on it, so runaway work
//! keeps occupying its slot. Waiting for a permit counts against the timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::panic_message;
use super::record::ScheduledRegistry;
use crate::core::stop::StopSignal;
use crate::core::task::{ExecutionKind, Task, TaskArgs, TaskContext, TaskError, TaskOutput};
use crate::core::types::{JobId, RunId};
use crate::notify::Notifier;

/// Default number of concurrent scheduled runs.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// How a guarded scheduled run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Task returned a value.
    Completed(TaskOutput),
    /// Task returned an error or panicked.
    Failed(String),
    /// Timeout elapsed before the task returned.
    TimedOut,
    /// Another run of the same job was already tracked.
    Skipped,
    /// The pool was closed, or the task stopped on request.
    Cancelled,
}

impl RunOutcome {
    /// The task's result on success, `None` otherwise.
    pub fn into_output(self) -> Option<TaskOutput> {
        match self {
            RunOutcome::Completed(output) => Some(output),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// A job id reserved in the scheduled registry, ready to run.
#[derive(Debug)]
pub struct Claim {
    job_id: JobId,
    run_id: RunId,
    stop: StopSignal,
    args: TaskArgs,
}

impl Claim {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }
}

enum Attempt {
    PoolClosed,
    Finished(Result<Result<TaskOutput, TaskError>, JoinError>),
}

/// Runs scheduled task functions on the bounded pool under a timeout.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    pool: Arc<Semaphore>,
    pool_size: usize,
    registry: Arc<ScheduledRegistry>,
    notifier: Notifier,
}

impl TimeoutGuard {
    pub fn new(pool_size: usize, notifier: Notifier) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            pool: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            registry: Arc::new(ScheduledRegistry::new()),
            notifier,
        }
    }

    /// Pool capacity.
    pub fn capacity(&self) -> usize {
        self.pool_size
    }

    /// Free pool slots.
    pub fn available(&self) -> usize {
        if self.pool.is_closed() {
            0
        } else {
            self.pool.available_permits()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub fn registry(&self) -> &Arc<ScheduledRegistry> {
        &self.registry
    }

    /// Reserve `job_id` in the scheduled registry.
    ///
    /// Returns `None` when a run of the job is already tracked.
    pub fn claim(&self, job_id: &JobId, args: &TaskArgs) -> Option<Claim> {
        let (run_id, stop) = self.registry.claim(job_id, args)?;
        Some(Claim {
            job_id: job_id.clone(),
            run_id,
            stop,
            args: args.clone(),
        })
    }

    /// Claim and run in one step.
    pub async fn run_with_timeout(
        &self,
        job_id: &JobId,
        task: Arc<dyn Task>,
        args: &TaskArgs,
        timeout: Duration,
    ) -> RunOutcome {
        match self.claim(job_id, args) {
            Some(claim) => self.run(claim, task, timeout).await,
            None => {
                debug!(job_id = %job_id, "job already running, skipping");
                RunOutcome::Skipped
            }
        }
    }

    /// Run a claimed job. Never returns an error; every ending is an outcome
    /// with exactly one terminal notification.
    pub async fn run(&self, claim: Claim, task: Arc<dyn Task>, timeout: Duration) -> RunOutcome {
        let Claim {
            job_id,
            run_id,
            stop,
            args,
        } = claim;

        info!(job_id = %job_id, run_id = %run_id, "scheduled run started");
        self.notifier.notify(format!("Task '{job_id}' started"));

        let ctx = TaskContext::new(
            job_id.as_str(),
            ExecutionKind::Scheduled,
            args,
            stop.clone(),
            self.notifier.clone(),
        );
        let pool = Arc::clone(&self.pool);
        let started = Instant::now();

        let attempt = async move {
            let Ok(permit) = pool.acquire_owned().await else {
                return Attempt::PoolClosed;
            };
            let blocking = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                task.execute(&ctx)
            });
            Attempt::Finished(blocking.await)
        };

        let outcome = match tokio::time::timeout(timeout, attempt).await {
            Ok(Attempt::Finished(Ok(Ok(output)))) => {
                let elapsed = started.elapsed();
                info!(job_id = %job_id, run_id = %run_id, elapsed_ms = elapsed.as_millis(), "scheduled run completed");
                self.notifier.notify(format!(
                    "Task '{job_id}' completed in {:.2}s",
                    elapsed.as_secs_f64()
                ));
                RunOutcome::Completed(output)
            }
            Ok(Attempt::Finished(Ok(Err(TaskError::Stopped)))) => {
                info!(job_id = %job_id, run_id = %run_id, "scheduled run stopped on request");
                self.notifier.notify(format!("Task '{job_id}' stopped"));
                RunOutcome::Cancelled
            }
            Ok(Attempt::Finished(Ok(Err(e)))) => {
                error!(job_id = %job_id, run_id = %run_id, error = %e, "scheduled run failed");
                self.notifier.notify(format!("Task '{job_id}' failed: {e}"));
                RunOutcome::Failed(e.to_string())
            }
            Ok(Attempt::Finished(Err(join_error))) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic().as_ref())
                } else {
                    join_error.to_string()
                };
                let e = TaskError::Panicked(message);
                error!(job_id = %job_id, run_id = %run_id, error = %e, "scheduled run failed");
                self.notifier.notify(format!("Task '{job_id}' failed: {e}"));
                RunOutcome::Failed(e.to_string())
            }
            Ok(Attempt::PoolClosed) => {
                warn!(job_id = %job_id, run_id = %run_id, "worker pool closed, run cancelled");
                self.notifier
                    .notify(format!("Task '{job_id}' cancelled: worker pool is shut down"));
                RunOutcome::Cancelled
            }
            Err(_) => {
                stop.request_stop();
                warn!(
                    job_id = %job_id,
                    run_id = %run_id,
                    timeout_secs = timeout.as_secs_f64(),
                    "scheduled run timed out, abandoning"
                );
                self.notifier
                    .notify(format!("Task '{job_id}' timed out after {timeout:?}"));
                RunOutcome::TimedOut
            }
        };

        self.registry.release(&job_id, run_id);
        outcome
    }

    /// Close the pool and abandon every tracked run.
    ///
    /// Pending permit waits fail at once; running task functions get their
    /// stop signal set but are not waited for. Returns the abandoned job ids.
    pub fn shutdown(&self) -> Vec<JobId> {
        self.pool.close();
        let abandoned: Vec<JobId> = self
            .registry
            .drain()
            .into_iter()
            .map(|(job_id, stop)| {
                stop.request_stop();
                warn!(job_id = %job_id, "abandoning scheduled run at shutdown");
                job_id
            })
            .collect();
        info!(abandoned = abandoned.len(), "worker pool shut down");
        abandoned
    }
}
