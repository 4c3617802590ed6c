//! Scheduler engine implementation.
//!
//! The scheduler is responsible for:
//! - Firing registered jobs when their trigger comes due
//! - Enforcing at most one live run per job id
//! - Manual job triggers
//! - Pause and resume functionality
//! - A bounded shutdown that stops manual tasks and abandons scheduled runs
//!
//! Job definitions live in a shared registry that handles modify directly;
//! the loop keeps its own per-job plan of the next fire time, tagged with the
//! registration revision, and re-plans whenever a job is replaced.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use super::handle::{COMMAND_CHANNEL_BUFFER, SchedulerHandle};
use super::types::{SchedulerCommand, SchedulerError, SchedulerState, ShutdownReport};
use crate::core::job::Job;
use crate::core::types::{JobId, RunId};
use crate::execution::guard::DEFAULT_POOL_SIZE;
use crate::execution::manual::DEFAULT_STOP_GRACE;
use crate::execution::{ManualTasks, TimeoutGuard};
use crate::notify::Notifier;

/// Default interval between schedule checks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on the whole shutdown sequence.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Cap on counting missed occurrences for the log.
const MAX_MISSED_COUNT: usize = 100;

/// A job definition plus the revision it was registered under.
#[derive(Debug, Clone)]
pub(crate) struct RegisteredJob {
    pub(crate) job: Job,
    pub(crate) revision: u64,
}

/// State shared between the loop and every handle.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) jobs: RwLock<HashMap<JobId, RegisteredJob>>,
    pub(crate) state: RwLock<SchedulerState>,
    pub(crate) guard: TimeoutGuard,
    pub(crate) manual: ManualTasks,
    pub(crate) notifier: Notifier,
    revision: AtomicU64,
    stop_grace: Duration,
    shutdown_timeout: Duration,
}

impl Shared {
    pub(crate) fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Claim `job` and run it on the guard in the background.
    fn fire(&self, job: &Job, firings: &mut JoinSet<()>) -> Result<RunId, SchedulerError> {
        let Some(claim) = self.guard.claim(job.id(), job.args()) else {
            tracing::debug!(job_id = %job.id(), "Job already running, skipping firing");
            return Err(SchedulerError::AlreadyRunning(job.id().to_string()));
        };
        let run_id = claim.run_id();
        let guard = self.guard.clone();
        let task = Arc::clone(job.task());
        let timeout = job.timeout();
        firings.spawn(async move {
            guard.run(claim, task, timeout).await;
        });
        Ok(run_id)
    }

    async fn trigger_job(
        &self,
        job_id: &JobId,
        firings: &mut JoinSet<()>,
    ) -> Result<RunId, SchedulerError> {
        let job = {
            let jobs = self.jobs.read().await;
            let registered = jobs
                .get(job_id)
                .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
            registered.job.clone()
        };
        tracing::info!(job_id = %job_id, "Triggering job on request");
        self.fire(&job, firings)
    }

    /// Fire every enabled job whose planned time has passed.
    ///
    /// A job that missed several occurrences (slow tick, clock jump) fires
    /// once and is re-planned from `now`.
    async fn fire_due(
        &self,
        plans: &mut HashMap<JobId, Plan>,
        firings: &mut JoinSet<()>,
        now: DateTime<Utc>,
    ) {
        let jobs = self.jobs.read().await;
        plans.retain(|id, _| jobs.contains_key(id));

        for (id, registered) in jobs.iter() {
            if !registered.job.is_enabled() {
                plans.remove(id);
                continue;
            }

            let plan = plans
                .entry(id.clone())
                .or_insert_with(|| Plan::new(registered, now));
            if plan.revision != registered.revision {
                tracing::debug!(job_id = %id, "Job definition changed, re-planning");
                *plan = Plan::new(registered, now);
            }

            let Some(due) = plan.next else {
                continue;
            };
            if due > now {
                continue;
            }

            let trigger = registered.job.trigger();
            let missed = trigger.occurrences_between(due, now, MAX_MISSED_COUNT);
            if missed >= MAX_MISSED_COUNT {
                tracing::warn!(
                    job_id = %id,
                    missed_occurrences = format!("{missed}+"),
                    "Many scheduled occurrences missed, firing once"
                );
            } else if missed > 0 {
                tracing::warn!(
                    job_id = %id,
                    missed_occurrences = missed,
                    "Scheduled occurrences missed, firing once"
                );
            }
            plan.next = trigger.next_after(now);

            tracing::info!(job_id = %id, due = %due, "Firing scheduled job");
            let _ = self.fire(&registered.job, firings);
        }
    }

    async fn shutdown(&self, firings: &mut JoinSet<()>) -> ShutdownReport {
        *self.state.write().await = SchedulerState::Stopped;
        tracing::info!(
            shutdown_timeout_secs = self.shutdown_timeout.as_secs_f64(),
            "Scheduler shutting down"
        );

        self.manual.close();
        let grace = self.stop_grace.min(self.shutdown_timeout);
        let (manual, timed_out) =
            match tokio::time::timeout(self.shutdown_timeout, self.manual.stop_all_within(grace))
                .await
            {
                Ok(results) => (results, false),
                Err(_) => {
                    tracing::warn!("Stopping manual tasks exceeded the shutdown timeout");
                    (Vec::new(), true)
                }
            };

        let abandoned = self.guard.shutdown();
        firings.abort_all();

        let stopped = manual.iter().filter(|(_, o)| o.is_success()).count();
        let unresponsive = manual.len() - stopped;
        tracing::info!(
            manual_stopped = stopped,
            manual_unresponsive = unresponsive,
            scheduled_abandoned = abandoned.len(),
            "Scheduler stopped"
        );
        self.notifier.notify(format!(
            "Scheduler stopped: {stopped} manual task(s) stopped, {unresponsive} unresponsive, {} scheduled run(s) abandoned",
            abandoned.len()
        ));

        ShutdownReport {
            manual,
            abandoned,
            timed_out,
        }
    }
}

/// Next planned fire time of one job.
#[derive(Debug)]
struct Plan {
    revision: u64,
    next: Option<DateTime<Utc>>,
}

impl Plan {
    fn new(registered: &RegisteredJob, now: DateTime<Utc>) -> Self {
        Self {
            revision: registered.revision,
            next: registered.job.trigger().next_after(now),
        }
    }
}

/// Main scheduler for job execution.
pub struct Scheduler {
    /// Jobs registered before start.
    jobs: HashMap<JobId, Job>,
    /// Notification bridge shared with tasks.
    notifier: Notifier,
    /// Tick interval for checking schedules.
    tick_interval: Duration,
    /// Scheduled worker pool size.
    pool_size: usize,
    /// Grace period for stopping manual tasks.
    stop_grace: Duration,
    /// Bound on the whole shutdown sequence.
    shutdown_timeout: Duration,
}

impl Scheduler {
    /// Create a new scheduler with default settings.
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            notifier: Notifier::new(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            pool_size: DEFAULT_POOL_SIZE,
            stop_grace: DEFAULT_STOP_GRACE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the notification bridge.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the scheduled worker pool size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the grace period for stopping manual tasks.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Register a job with the scheduler, replacing any job with the same id.
    pub fn register(&mut self, job: Job) {
        tracing::info!(job_id = %job.id(), trigger = %job.trigger(), "Job registered");
        self.notifier.notify(format!(
            "Job '{}' registered with schedule {}",
            job.id(),
            job.trigger()
        ));
        self.jobs.insert(job.id().clone(), job);
    }

    /// Get a registered job by ID.
    pub fn get_job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// List all registered jobs.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Start the scheduler and return a handle for controlling it.
    pub async fn start(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);

        let revision = AtomicU64::new(0);
        let jobs = self
            .jobs
            .into_iter()
            .map(|(id, job)| {
                let revision = revision.fetch_add(1, Ordering::SeqCst) + 1;
                (id, RegisteredJob { job, revision })
            })
            .collect();

        let shared = Arc::new(Shared {
            jobs: RwLock::new(jobs),
            state: RwLock::new(SchedulerState::Running),
            guard: TimeoutGuard::new(self.pool_size, self.notifier.clone()),
            manual: ManualTasks::new(self.notifier.clone(), self.stop_grace),
            notifier: self.notifier,
            revision,
            stop_grace: self.stop_grace,
            shutdown_timeout: self.shutdown_timeout,
        });

        let handle = SchedulerHandle {
            command_tx,
            shared: Arc::clone(&shared),
        };

        let tick_interval = self.tick_interval;
        let scheduler_task = tokio::spawn(async move {
            run(shared, command_rx, tick_interval).await;
        });

        tracing::info!(
            tick_interval_ms = tick_interval.as_millis(),
            pool_size = self.pool_size,
            "Scheduler started"
        );
        (handle, scheduler_task)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Main scheduler loop.
async fn run(
    shared: Arc<Shared>,
    mut command_rx: mpsc::Receiver<SchedulerCommand>,
    tick_interval: Duration,
) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut plans: HashMap<JobId, Plan> = HashMap::new();
    let mut firings: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let current_state = *shared.state.read().await;
                if current_state == SchedulerState::Running {
                    shared.fire_due(&mut plans, &mut firings, Utc::now()).await;
                }

                // Reap finished firings
                while let Some(joined) = firings.try_join_next() {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Scheduled firing panicked");
                        }
                    }
                }
            }

            Some(command) = command_rx.recv() => {
                match command {
                    SchedulerCommand::Trigger { job_id, response } => {
                        let result = shared.trigger_job(&job_id, &mut firings).await;
                        let _ = response.send(result);
                    }
                    SchedulerCommand::Pause { response } => {
                        *shared.state.write().await = SchedulerState::Paused;
                        tracing::info!("Scheduler paused");
                        shared.notifier.notify("Scheduler paused");
                        let _ = response.send(());
                    }
                    SchedulerCommand::Resume { response } => {
                        *shared.state.write().await = SchedulerState::Running;
                        // Re-plan from now so occurrences during the pause are skipped.
                        plans.clear();
                        tracing::info!("Scheduler resumed, skipping any schedules that fired during pause");
                        shared.notifier.notify("Scheduler resumed");
                        let _ = response.send(());
                    }
                    SchedulerCommand::Shutdown { response } => {
                        let report = shared.shutdown(&mut firings).await;
                        let _ = response.send(report);
                        break;
                    }
                }
            }
        }
    }
}
