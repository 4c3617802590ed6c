//! HTTP API module for the cadence scheduler.
//!
//! Provides REST endpoints for triggering jobs, launching and stopping manual
//! tasks, querying status, and controlling the scheduler.

mod errors;
mod handlers;
mod responses;

pub use errors::{ApiError, ErrorResponse};
pub use handlers::ApiState;
pub use responses::*;

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::scheduler::SchedulerHandle;

/// Build the API router with all endpoints.
pub fn build_router(handle: SchedulerHandle) -> Router {
    Router::new()
        // Health and status
        .route("/api/health", get(handlers::health))
        .route("/api/status", get(handlers::get_status))
        // Scheduler control
        .route("/api/scheduler/state", get(handlers::get_scheduler_state))
        .route("/api/scheduler/pause", post(handlers::pause_scheduler))
        .route("/api/scheduler/resume", post(handlers::resume_scheduler))
        // Jobs
        .route("/api/jobs", get(handlers::list_jobs))
        .route("/api/jobs/{job_id}/trigger", post(handlers::trigger_job))
        // Manual tasks
        .route("/api/tasks/stop-all", post(handlers::stop_all_tasks))
        .route("/api/tasks/{name}", get(handlers::get_task))
        .route("/api/tasks/{name}/start", post(handlers::start_task))
        .route("/api/tasks/{name}/stop", post(handlers::stop_task))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(ApiState::new(handle))
}

/// Start the API server.
///
/// This function spawns the server and returns a handle to the task.
/// The server runs until the task is aborted or the process exits.
pub async fn start_server(
    addr: SocketAddr,
    handle: SchedulerHandle,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let router = build_router(handle);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("API server listening on http://{}", listener.local_addr()?);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    Ok(handle)
}
