//! Scheduler handle for controlling the scheduler.
//!
//! `SchedulerHandle` is the command surface: job registration, triggers,
//! pause/resume/shutdown, manual task launch and stop, and status snapshots.
//! It is cheap to clone and every method is safe to call concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::engine::{RegisteredJob, Shared};
use super::status::StatusView;
use super::types::{JobSummary, SchedulerCommand, SchedulerError, SchedulerState, ShutdownReport};
use crate::core::job::Job;
use crate::core::task::{Task, TaskArgs};
use crate::core::trigger::Trigger;
use crate::core::types::{JobId, RunId};
use crate::execution::{ExecutionRecord, StopOutcome};
use crate::notify::Notifier;

/// Buffer size for the command channel between SchedulerHandle and Scheduler.
pub(crate) const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Handle for controlling the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) command_tx: mpsc::Sender<SchedulerCommand>,
    pub(crate) shared: Arc<Shared>,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("closed", &self.command_tx.is_closed())
            .finish()
    }
}

impl SchedulerHandle {
    /// Helper to send a command and wait for its response.
    async fn send_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                SchedulerError::ChannelError(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            SchedulerError::ChannelError(format!("failed to receive {} response", operation))
        })
    }

    /// Helper to send a command that returns a result and wait for response.
    async fn send_result_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<Result<T, SchedulerError>>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulerError> {
        self.send_command(build_command, operation).await?
    }

    /// Install or replace a job.
    ///
    /// Replacement swaps the definition under one write lock; the loop
    /// re-plans the job from the moment it notices the new revision.
    pub async fn register(&self, job: Job) -> Result<(), SchedulerError> {
        if job.id().is_blank() {
            return Err(SchedulerError::InvalidJob("job id must not be empty".into()));
        }
        if self.state().await == SchedulerState::Stopped {
            return Err(SchedulerError::Stopped);
        }

        let id = job.id().clone();
        let trigger = job.trigger().to_string();
        let revision = self.shared.next_revision();
        let replaced = self
            .shared
            .jobs
            .write()
            .await
            .insert(id.clone(), RegisteredJob { job, revision })
            .is_some();

        if replaced {
            tracing::info!(job_id = %id, trigger = %trigger, "Job replaced");
        } else {
            tracing::info!(job_id = %id, trigger = %trigger, "Job registered");
        }
        self.shared
            .notifier
            .notify(format!("Job '{id}' registered with schedule {trigger}"));
        Ok(())
    }

    /// Parse `trigger` and register `task` under `job_id`.
    pub async fn register_task(
        &self,
        job_id: impl Into<JobId>,
        task: Arc<dyn Task>,
        timeout: Duration,
        trigger: &str,
        args: TaskArgs,
    ) -> Result<(), SchedulerError> {
        let trigger = Trigger::parse(trigger)?;
        let job = Job::new(job_id, trigger, task)
            .with_timeout(timeout)
            .with_args(args);
        self.register(job).await
    }

    /// Remove a job. A run already in flight is not affected.
    pub async fn unregister(&self, job_id: &JobId) -> bool {
        let removed = self.shared.jobs.write().await.remove(job_id).is_some();
        if removed {
            tracing::info!(job_id = %job_id, "Job unregistered");
        }
        removed
    }

    /// Fire a job now, subject to the single-instance rule.
    pub async fn trigger(&self, job_id: impl Into<JobId>) -> Result<RunId, SchedulerError> {
        let job_id = job_id.into();
        self.send_result_command(
            |response| SchedulerCommand::Trigger { job_id, response },
            "trigger",
        )
        .await
    }

    /// Pause the scheduler.
    ///
    /// While paused, scheduled jobs will not be triggered, but manual triggers still work.
    pub async fn pause(&self) -> Result<(), SchedulerError> {
        self.send_command(|response| SchedulerCommand::Pause { response }, "pause")
            .await
    }

    /// Resume the scheduler after being paused.
    pub async fn resume(&self) -> Result<(), SchedulerError> {
        self.send_command(|response| SchedulerCommand::Resume { response }, "resume")
            .await
    }

    /// Shut the scheduler down. Calling it again after shutdown is a no-op.
    pub async fn shutdown(&self) -> Result<ShutdownReport, SchedulerError> {
        if self.state().await == SchedulerState::Stopped {
            return Ok(ShutdownReport::default());
        }
        self.send_command(
            |response| SchedulerCommand::Shutdown { response },
            "shutdown",
        )
        .await
    }

    /// Get the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        *self.shared.state.read().await
    }

    /// Check if the scheduler is running.
    pub async fn is_running(&self) -> bool {
        self.state().await == SchedulerState::Running
    }

    /// Check if the scheduler is paused.
    pub async fn is_paused(&self) -> bool {
        self.state().await == SchedulerState::Paused
    }

    /// Launch the task of registered job `job_id` as manual task `name`.
    ///
    /// `args` are laid over the job's own arguments.
    pub async fn start_manual(
        &self,
        name: &str,
        job_id: &JobId,
        args: TaskArgs,
    ) -> Result<RunId, SchedulerError> {
        let (task, job_args) = {
            let jobs = self.shared.jobs.read().await;
            let registered = jobs
                .get(job_id)
                .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
            (
                Arc::clone(registered.job.task()),
                registered.job.args().clone(),
            )
        };
        self.start_manual_task(name, task, job_args.merged(&args))
    }

    /// Launch an arbitrary task as manual task `name`.
    pub fn start_manual_task(
        &self,
        name: &str,
        task: Arc<dyn Task>,
        args: TaskArgs,
    ) -> Result<RunId, SchedulerError> {
        Ok(self.shared.manual.start(name, task, args)?)
    }

    /// Stop manual task `name` within the configured grace period.
    pub async fn stop_manual(&self, name: &str) -> StopOutcome {
        self.shared.manual.stop(name).await
    }

    /// Stop every manual task, returning outcomes sorted by name.
    pub async fn stop_all_manual(&self) -> Vec<(String, StopOutcome)> {
        self.shared.manual.stop_all().await
    }

    /// Record of manual task `name`; a finished record is reaped by reading it.
    pub fn manual_record(&self, name: &str) -> Option<ExecutionRecord> {
        self.shared.manual.lookup(name)
    }

    /// Record of the tracked scheduled run of `job_id`.
    pub fn scheduled_record(&self, job_id: &JobId) -> Option<ExecutionRecord> {
        self.shared.guard.registry().get(job_id)
    }

    /// Registered jobs, sorted by id.
    pub async fn jobs(&self) -> Vec<JobSummary> {
        let now = chrono::Utc::now();
        let jobs = self.shared.jobs.read().await;
        let mut summaries: Vec<JobSummary> = jobs
            .values()
            .map(|registered| {
                let job = &registered.job;
                JobSummary {
                    id: job.id().clone(),
                    schedule: job.trigger().expression().to_string(),
                    timezone: job.trigger().timezone().name().to_string(),
                    enabled: job.is_enabled(),
                    timeout_secs: job.timeout().as_secs(),
                    description: job.description().map(str::to_string),
                    running: self.shared.guard.registry().contains(job.id()),
                    next_run: job
                        .is_enabled()
                        .then(|| job.trigger().next_after(now))
                        .flatten(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Consistent view of scheduler, manual and scheduled state.
    pub async fn snapshot(&self) -> StatusView {
        let state = self.state().await;
        let mut job_ids: Vec<JobId> = self.shared.jobs.read().await.keys().cloned().collect();
        job_ids.sort();

        let guard = &self.shared.guard;
        StatusView {
            scheduler_running: state != SchedulerState::Stopped,
            state,
            manual_running: self.shared.manual.running_names(),
            manual_unresponsive: self.shared.manual.unresponsive_names(),
            scheduled_running: guard.registry().running_ids(),
            job_count: job_ids.len(),
            job_ids,
            pool_capacity: guard.capacity(),
            pool_available: guard.available(),
        }
    }

    /// Notification bridge shared with tasks.
    pub fn notifier(&self) -> &Notifier {
        &self.shared.notifier
    }
}
