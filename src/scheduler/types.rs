//! Scheduler type definitions.
//!
//! This module contains error types, state enums, command types and the
//! serializable views the scheduler hands out.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::trigger::TriggerError;
use crate::core::types::{JobId, RunId};
use crate::execution::{LaunchError, StopOutcome};

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// A run of the job is already tracked.
    #[error("job already running: {0}")]
    AlreadyRunning(String),

    /// The trigger expression did not parse.
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// Manual launch refused.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Job definition rejected.
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// The scheduler has shut down.
    #[error("scheduler is stopped")]
    Stopped,

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),
}

/// State of the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Scheduler is stopped.
    #[default]
    Stopped,
    /// Scheduler is running.
    Running,
    /// Scheduler is paused.
    Paused,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Stopped => f.write_str("stopped"),
            SchedulerState::Running => f.write_str("running"),
            SchedulerState::Paused => f.write_str("paused"),
        }
    }
}

/// What a shutdown did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    /// Stop outcome per manual task, sorted by name.
    pub manual: Vec<(String, StopOutcome)>,
    /// Scheduled runs that were still tracked and got abandoned.
    pub abandoned: Vec<JobId>,
    /// Whether stopping manual tasks hit the overall shutdown timeout.
    pub timed_out: bool,
}

/// Registered job as exposed to the command surface.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub schedule: String,
    pub timezone: String,
    pub enabled: bool,
    pub timeout_secs: u64,
    pub description: Option<String>,
    pub running: bool,
    pub next_run: Option<DateTime<Utc>>,
}

/// Commands that can be sent to the scheduler loop.
pub(crate) enum SchedulerCommand {
    /// Fire a job now.
    Trigger {
        job_id: JobId,
        response: oneshot::Sender<Result<RunId, SchedulerError>>,
    },
    /// Pause the scheduler.
    Pause { response: oneshot::Sender<()> },
    /// Resume the scheduler.
    Resume { response: oneshot::Sender<()> },
    /// Shutdown the scheduler.
    Shutdown {
        response: oneshot::Sender<ShutdownReport>,
    },
}
