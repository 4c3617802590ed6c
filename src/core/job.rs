//! Job definition: a named task bound to a trigger.

use std::sync::Arc;
use std::time::Duration;

use super::task::{Task, TaskArgs};
use super::trigger::Trigger;
use super::types::JobId;

/// Default per-run timeout for scheduled jobs.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// A recurring job registered with the scheduler.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    trigger: Trigger,
    task: Arc<dyn Task>,
    args: TaskArgs,
    timeout: Duration,
    enabled: bool,
    description: Option<String>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("timeout", &self.timeout)
            .field("enabled", &self.enabled)
            .field("description", &self.description())
            .finish()
    }
}

impl Job {
    /// Create an enabled job with the default timeout and no arguments.
    pub fn new(id: impl Into<JobId>, trigger: Trigger, task: Arc<dyn Task>) -> Self {
        Self {
            id: id.into(),
            trigger,
            task,
            args: TaskArgs::default(),
            timeout: DEFAULT_JOB_TIMEOUT,
            enabled: true,
            description: None,
        }
    }

    /// Set the fixed arguments passed on every run.
    pub fn with_args(mut self, args: TaskArgs) -> Self {
        self.args = args;
        self
    }

    /// Set the per-run timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable scheduled firing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    pub fn args(&self) -> &TaskArgs {
        &self.args
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Explicit description, falling back to the task's own.
    pub fn description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .or_else(|| self.task.description())
    }
}
