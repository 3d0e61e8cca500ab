//! Command responses end to end: envelope shape, status codes and task
//! tracking over a temporary database and a mock calendar service.

mod support;

use calsync_api::commands;
use calsync_core::{RunControl, TaskTracker};
use calsync_domain::{CourseMapping, NewTask};
use serde_json::json;
use support::{TestApp, TERM};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test(flavor = "multi_thread")]
async fn malformed_term_is_a_validation_error() {
    let app = TestApp::new().await;

    let response = commands::start_incremental_sync(&app.ctx, "spring", None).await;

    assert_eq!(response.status(), 400);
    let json = response.to_json();
    assert_eq!(json["success"], false);
    assert_eq!(json["errorDetails"]["code"], "validation_error");
    assert_eq!(app.count("SELECT COUNT(*) FROM sync_tasks"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn incremental_sync_records_a_completed_task() {
    let app = TestApp::new().await;
    app.seed_course("CS101", "t-1", &["s-1"], "cal-cs101");
    app.add_schedule_row("CS101", "2025-03-01", "08:00", "09:40", "t-1");

    let response = commands::start_incremental_sync(&app.ctx, TERM, Some(10)).await;
    assert_eq!(response.status(), 200);
    let json = response.to_json();
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["processedCourses"], 1);
    assert_eq!(json["data"]["newAggregates"], 1);

    let task_id = json["data"]["taskId"].as_str().unwrap().to_string();
    let status = commands::get_run_status(&app.ctx, &task_id).await.to_json();
    assert_eq!(status["data"]["task"]["status"], "completed");
    assert_eq!(status["data"]["task"]["payload"], json!({"term": TERM, "batchSize": 10}));
    assert_eq!(status["data"]["task"]["result"]["newAggregates"], 1);
    assert_eq!(status["data"]["live"], false);

    // Nothing changed since
    let again = commands::start_incremental_sync(&app.ctx, TERM, None).await.to_json();
    assert_eq!(again["data"]["processedCourses"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn active_task_for_the_term_is_a_conflict() {
    let app = TestApp::new().await;
    app.ctx.tasks.create(NewTask::incremental_sync(TERM, 50)).await.unwrap();

    let response = commands::start_incremental_sync(&app.ctx, TERM, None).await;

    assert_eq!(response.status(), 409);
    assert_eq!(response.to_json()["errorDetails"]["code"], "concurrency_conflict");
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_pipeline_answers_500_with_stats() {
    let app = TestApp::new().await;
    app.add_schedule_row("CS101", "2025-03-01", "08:00", "09:40", "t-1");
    app.execute_batch("DROP TABLE course_aggregates;");

    let response = commands::start_incremental_sync(&app.ctx, TERM, None).await;

    assert_eq!(response.status(), 500);
    let json = response.to_json();
    assert_eq!(json["error"], "An unexpected error occurred");
    let context = &json["errorDetails"]["context"];
    assert_eq!(context["status"], "failed");
    assert_eq!(context["processedCourses"], 1);
    assert!(context.get("error").is_none());

    let task_id = context["taskId"].as_str().unwrap().to_string();
    let task = app.ctx.tasks.status(&task_id).await.unwrap();
    assert_eq!(task.status.as_str(), "failed");
    let raw_error = task.error.expect("task keeps the pipeline error");
    assert!(!json.to_string().contains(&raw_error));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_tasks_are_not_found() {
    let app = TestApp::new().await;

    assert_eq!(commands::get_run_status(&app.ctx, "missing").await.status(), 404);
    assert_eq!(commands::cancel_run(&app.ctx, "missing").await.status(), 404);
    assert_eq!(commands::retry_run(&app.ctx, "missing").await.status(), 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_course_requires_a_mapping() {
    let app = TestApp::new().await;

    let response = commands::sync_course(&app.ctx, "CS404", None).await;

    assert_eq!(response.status(), 404);
    assert_eq!(response.to_json()["errorDetails"]["code"], "not_found");
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_course_adds_missing_participants() {
    let app = TestApp::new().await;
    app.seed_course("CS101", "t-1", &["s-1"], "cal-cs101");

    Mock::given(method("GET"))
        .and(path("/api/v1/calendars/cal-cs101/grants"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&app.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/calendars/cal-cs101/grants:batchCreate"))
        .and(body_json(json!({
            "grants": [
                {"userId": "t-1", "role": "writer"},
                {"userId": "s-1", "role": "reader"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&app.server)
        .await;

    let json = commands::sync_course(&app.ctx, "CS101", None).await.to_json();

    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["calendarId"], "cal-cs101");
    assert_eq!(json["data"]["addedCount"], 2);
    assert_eq!(json["data"]["removedCount"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn bulk_reconciliation_reports_busy_courses() {
    let app = TestApp::new().await;
    app.ctx.tasks.create(NewTask::course_reconciliation("CS101", "cal-cs101")).await.unwrap();

    let mapping = CourseMapping {
        course_code: "CS101".into(),
        term: TERM.into(),
        calendar_id: "cal-cs101".into(),
    };
    let json = commands::sync_many(&app.ctx, vec![mapping]).await.to_json();

    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["failed"], 1);
    assert_eq!(json["data"]["courses"][0]["success"], false);

    let parent_id = json["data"]["taskId"].as_str().unwrap().to_string();
    let status = commands::get_run_status(&app.ctx, &parent_id).await.to_json();
    assert_eq!(status["data"]["task"]["status"], "failed");
    assert_eq!(status["data"]["children"], json!([]));
}

#[tokio::test(flavor = "multi_thread")]
async fn reconcile_all_without_mappings_completes_empty() {
    let app = TestApp::new().await;

    let json = commands::reconcile_all(&app.ctx).await.to_json();

    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["succeeded"], 0);
    assert_eq!(json["data"]["courses"], json!([]));
    assert_eq!(app.count("SELECT COUNT(*) FROM sync_tasks WHERE status = 'completed'"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_task_can_be_retried() {
    let app = TestApp::new().await;
    let task = app.ctx.tasks.create(NewTask::incremental_sync(TERM, 20)).await.unwrap();

    // Pending tasks cannot be paused
    assert_eq!(commands::pause_run(&app.ctx, &task.id).await.status(), 400);

    let cancelled = commands::cancel_run(&app.ctx, &task.id).await.to_json();
    assert_eq!(cancelled["data"]["status"], "cancelled");

    let retried = commands::retry_run(&app.ctx, &task.id).await.to_json();
    assert_eq!(retried["success"], true);
    assert_ne!(retried["data"]["taskId"], json!(task.id));
    assert_eq!(retried["data"]["status"], "completed");
    assert_eq!(retried["data"]["term"], TERM);
}

#[tokio::test(flavor = "multi_thread")]
async fn live_runs_are_signalled_not_rewritten() {
    let app = TestApp::new().await;
    let task = app.ctx.tasks.create(NewTask::incremental_sync(TERM, 20)).await.unwrap();
    app.ctx.tasks.start(&task.id).await.unwrap();
    let control = RunControl::new();
    app.ctx.runner.runs().insert(&task.id, control.clone());

    let paused = commands::pause_run(&app.ctx, &task.id).await.to_json();
    assert_eq!(paused["data"]["status"], "paused");
    assert!(control.is_paused());

    let status = commands::get_run_status(&app.ctx, &task.id).await.to_json();
    assert_eq!(status["data"]["live"], true);
    assert_eq!(status["data"]["paused"], true);

    // The run records its own cancellation
    let cancelled = commands::cancel_run(&app.ctx, &task.id).await.to_json();
    assert_eq!(cancelled["data"]["status"], "paused");
    assert!(control.is_cancelled());
}

#[tokio::test(flavor = "multi_thread")]
async fn scheduler_stays_off_when_disabled() {
    let app = TestApp::new().await;

    assert!(!app.ctx.start_reconcile_scheduler().await.unwrap());
    assert!(!app.ctx.is_scheduler_running().await);
    app.ctx.shutdown().await.unwrap();
}
