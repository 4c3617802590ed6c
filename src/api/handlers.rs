//! API request handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::core::types::JobId;
use crate::execution::ExecutionRecord;
use crate::scheduler::{SchedulerHandle, StatusView};

use super::errors::ApiError;
use super::responses::{
    HealthResponse, JobListResponse, MessageResponse, SchedulerStateResponse, StartTaskRequest,
    StartTaskResponse, StopAllResponse, StopTaskResponse, TriggerResponse,
};

/// Shared application state for API handlers.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub handle: SchedulerHandle,
}

impl ApiState {
    pub fn new(handle: SchedulerHandle) -> Self {
        Self { handle }
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Aggregated status of scheduler, manual tasks and scheduled runs.
pub async fn get_status(State(state): State<ApiState>) -> Json<StatusView> {
    Json(state.handle.snapshot().await)
}

/// Get scheduler state.
pub async fn get_scheduler_state(State(state): State<ApiState>) -> Json<SchedulerStateResponse> {
    let scheduler_state = state.handle.state().await;
    Json(SchedulerStateResponse::from(scheduler_state))
}

/// Pause the scheduler.
pub async fn pause_scheduler(
    State(state): State<ApiState>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.handle.pause().await?;
    Ok(Json(MessageResponse {
        message: "scheduler paused".to_string(),
    }))
}

/// Resume the scheduler.
pub async fn resume_scheduler(
    State(state): State<ApiState>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.handle.resume().await?;
    Ok(Json(MessageResponse {
        message: "scheduler resumed".to_string(),
    }))
}

/// List all jobs.
pub async fn list_jobs(State(state): State<ApiState>) -> Json<JobListResponse> {
    let jobs = state.handle.jobs().await;
    let count = jobs.len();
    Json(JobListResponse { jobs, count })
}

/// Trigger a job.
pub async fn trigger_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let run_id = state.handle.trigger(job_id.as_str()).await?;
    Ok(Json(TriggerResponse {
        run_id: run_id.to_string(),
        message: format!("job '{}' triggered", job_id),
        job_id,
    }))
}

/// Launch a manual task.
pub async fn start_task(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Option<Json<StartTaskRequest>>,
) -> Result<(StatusCode, Json<StartTaskResponse>), ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let job_id = JobId::new(request.job.unwrap_or_else(|| name.clone()));
    let run_id = state
        .handle
        .start_manual(&name, &job_id, request.args)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartTaskResponse {
            message: format!("manual task '{}' started", name),
            name,
            job_id: job_id.to_string(),
            run_id: run_id.to_string(),
        }),
    ))
}

/// Stop a manual task.
///
/// Answers 200 when the task is gone and 202 when it is still running after
/// the grace period.
pub async fn stop_task(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<StopTaskResponse>) {
    let outcome = state.handle.stop_manual(&name).await;
    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    (status, Json(StopTaskResponse::new(name, outcome)))
}

/// Stop every manual task.
pub async fn stop_all_tasks(State(state): State<ApiState>) -> (StatusCode, Json<StopAllResponse>) {
    let results: Vec<StopTaskResponse> = state
        .handle
        .stop_all_manual()
        .await
        .into_iter()
        .map(|(name, outcome)| StopTaskResponse::new(name, outcome))
        .collect();
    let all_stopped = results.iter().all(|r| r.success);
    let status = if all_stopped {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    (
        status,
        Json(StopAllResponse {
            results,
            all_stopped,
        }),
    )
}

/// Record of a manual task. Reading a finished record removes it.
pub async fn get_task(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<ExecutionRecord>, ApiError> {
    state
        .handle
        .manual_record(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("manual task not found: {}", name)))
}
