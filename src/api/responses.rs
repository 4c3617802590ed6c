//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::core::task::TaskArgs;
use crate::execution::StopOutcome;
use crate::scheduler::{JobSummary, SchedulerState};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Scheduler state response.
#[derive(Debug, Serialize)]
pub struct SchedulerStateResponse {
    pub state: SchedulerState,
    pub is_running: bool,
    pub is_paused: bool,
}

impl From<SchedulerState> for SchedulerStateResponse {
    fn from(state: SchedulerState) -> Self {
        Self {
            state,
            is_running: state == SchedulerState::Running,
            is_paused: state == SchedulerState::Paused,
        }
    }
}

/// List of jobs response.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
    pub count: usize,
}

/// Response after triggering a job.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub run_id: String,
    pub job_id: String,
    pub message: String,
}

/// Body of a manual task start request. Both fields are optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartTaskRequest {
    /// Registered job whose task runs; defaults to the task name.
    pub job: Option<String>,
    /// Arguments laid over the job's own.
    pub args: TaskArgs,
}

/// Response after starting a manual task.
#[derive(Debug, Serialize)]
pub struct StartTaskResponse {
    pub name: String,
    pub job_id: String,
    pub run_id: String,
    pub message: String,
}

/// Result of stopping one manual task.
#[derive(Debug, Serialize)]
pub struct StopTaskResponse {
    pub name: String,
    pub outcome: StopOutcome,
    pub success: bool,
    pub message: String,
}

impl StopTaskResponse {
    pub fn new(name: impl Into<String>, outcome: StopOutcome) -> Self {
        let name = name.into();
        let message = match outcome {
            StopOutcome::NotRunning => format!("manual task '{}' is not running", name),
            StopOutcome::AlreadyFinished => format!("manual task '{}' had already finished", name),
            StopOutcome::Stopped => format!("manual task '{}' stopped", name),
            StopOutcome::ForcedStopRequired => {
                format!("manual task '{}' did not stop, forced stop required", name)
            }
        };
        Self {
            name,
            success: outcome.is_success(),
            outcome,
            message,
        }
    }
}

/// Result of stopping every manual task.
#[derive(Debug, Serialize)]
pub struct StopAllResponse {
    pub results: Vec<StopTaskResponse>,
    pub all_stopped: bool,
}

/// Generic message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
