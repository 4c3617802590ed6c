//! API integration tests.
//!
//! These tests drive the router directly and verify status codes and bodies.

use cadence::api::build_router;
use cadence::{Job, Scheduler, SchedulerHandle, TaskArgs, Trigger, from_fn};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

use crate::common::{cooperative_task, stubborn_task};

/// Create a running scheduler with a quick job and a long job.
async fn create_test_handle() -> SchedulerHandle {
    let mut scheduler = Scheduler::new().with_stop_grace(Duration::from_millis(300));
    scheduler.register(
        Job::new(
            "test_job",
            Trigger::parse("*/5 * * * *").unwrap(),
            from_fn(|ctx| Ok(json!({ "mode": ctx.args().text("mode") }))),
        )
        .with_args(TaskArgs::new().with("mode", "full"))
        .with_description("Quick job"),
    );
    scheduler.register(Job::new(
        "long_job",
        Trigger::parse("@yearly").unwrap(),
        cooperative_task(Duration::from_secs(10)),
    ));
    scheduler.register(Job::new(
        "stuck_job",
        Trigger::parse("@yearly").unwrap(),
        stubborn_task(Duration::from_secs(2)),
    ));
    let (handle, _task) = scheduler.start().await;
    handle
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Test: Health endpoint responds with status ok.
#[tokio::test]
async fn test_health_endpoint() {
    let router = build_router(create_test_handle().await);
    let (status, json) = send(&router, "GET", "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

/// Test: Scheduler state follows pause and resume.
#[tokio::test]
async fn test_scheduler_state_pause_resume() {
    let router = build_router(create_test_handle().await);

    let (status, json) = send(&router, "GET", "/api/scheduler/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "running");
    assert_eq!(json["is_running"], true);
    assert_eq!(json["is_paused"], false);

    let (status, json) = send(&router, "POST", "/api/scheduler/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "scheduler paused");
    let (_, json) = send(&router, "GET", "/api/scheduler/state", None).await;
    assert_eq!(json["state"], "paused");
    assert_eq!(json["is_paused"], true);

    let (status, _) = send(&router, "POST", "/api/scheduler/resume", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = send(&router, "GET", "/api/scheduler/state", None).await;
    assert_eq!(json["state"], "running");
}

/// Test: List jobs endpoint returns registered jobs sorted by id.
#[tokio::test]
async fn test_list_jobs_endpoint() {
    let router = build_router(create_test_handle().await);
    let (status, json) = send(&router, "GET", "/api/jobs", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 3);
    assert_eq!(json["jobs"][0]["id"], "long_job");
    assert_eq!(json["jobs"][2]["id"], "test_job");
    assert_eq!(json["jobs"][2]["schedule"], "*/5 * * * *");
    assert_eq!(json["jobs"][2]["timezone"], "UTC");
    assert_eq!(json["jobs"][2]["description"], "Quick job");
    assert_eq!(json["jobs"][2]["running"], false);
    assert!(json["jobs"][2]["next_run"].is_string());
}

/// Test: Trigger endpoint starts a run and refuses an overlapping one.
#[tokio::test]
async fn test_trigger_job_endpoint() {
    let router = build_router(create_test_handle().await);

    let (status, json) = send(&router, "POST", "/api/jobs/long_job/trigger", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["job_id"], "long_job");
    assert!(json["run_id"].is_string());

    let (status, json) = send(&router, "POST", "/api/jobs/long_job/trigger", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");

    let (_, json) = send(&router, "GET", "/api/status", None).await;
    assert_eq!(json["scheduled_running"], json!(["long_job"]));
}

/// Test: Trigger endpoint returns 404 for unknown jobs.
#[tokio::test]
async fn test_trigger_unknown_job() {
    let router = build_router(create_test_handle().await);
    let (status, json) = send(&router, "POST", "/api/jobs/nonexistent/trigger", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert!(json["error"].as_str().unwrap().contains("nonexistent"));
}

/// Test: Manual task lifecycle over the API.
#[tokio::test]
async fn test_manual_task_lifecycle() {
    let router = build_router(create_test_handle().await);

    let (status, json) = send(
        &router,
        "POST",
        "/api/tasks/backfill/start",
        Some(json!({ "job": "long_job" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["name"], "backfill");
    assert_eq!(json["job_id"], "long_job");

    let (status, json) = send(
        &router,
        "POST",
        "/api/tasks/backfill/start",
        Some(json!({ "job": "long_job" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");

    let (status, json) = send(&router, "GET", "/api/tasks/backfill", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "running");
    assert_eq!(json["kind"], "manual");

    let (_, json) = send(&router, "GET", "/api/status", None).await;
    assert_eq!(json["manual_running"], json!(["backfill"]));

    let (status, json) = send(&router, "POST", "/api/tasks/backfill/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "stopped");
    assert_eq!(json["success"], true);

    let (status, _) = send(&router, "GET", "/api/tasks/backfill", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Test: Start without a body runs the job named like the task.
#[tokio::test]
async fn test_start_task_defaults_to_job_of_same_name() {
    let router = build_router(create_test_handle().await);

    let (status, json) = send(&router, "POST", "/api/tasks/test_job/start", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["job_id"], "test_job");

    let mut record = Value::Null;
    for _ in 0..100 {
        let (_, json) = send(&router, "GET", "/api/tasks/test_job", None).await;
        if json["status"] == "completed" {
            record = json;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(record["result"], json!({ "mode": "full" }));

    let (status, json) = send(
        &router,
        "POST",
        "/api/tasks/other/start",
        Some(json!({ "job": "test_job", "args": { "mode": "delta" } })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["job_id"], "test_job");

    let (status, _) = send(&router, "POST", "/api/tasks/missing/start", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Test: Stopping an unknown task succeeds; a stubborn one is accepted only.
#[tokio::test]
async fn test_stop_endpoints() {
    let router = build_router(create_test_handle().await);

    let (status, json) = send(&router, "POST", "/api/tasks/ghost/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "not_running");
    assert_eq!(json["success"], true);

    send(
        &router,
        "POST",
        "/api/tasks/stuck/start",
        Some(json!({ "job": "stuck_job" })),
    )
    .await;
    send(
        &router,
        "POST",
        "/api/tasks/polite/start",
        Some(json!({ "job": "long_job" })),
    )
    .await;

    let (status, json) = send(&router, "POST", "/api/tasks/stop-all", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["all_stopped"], false);
    assert_eq!(json["results"][0]["name"], "polite");
    assert_eq!(json["results"][0]["outcome"], "stopped");
    assert_eq!(json["results"][1]["name"], "stuck");
    assert_eq!(json["results"][1]["outcome"], "forced_stop_required");

    let (_, json) = send(&router, "GET", "/api/status", None).await;
    assert_eq!(json["manual_unresponsive"], json!(["stuck"]));
}
