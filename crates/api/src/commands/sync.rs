//! Incremental propagation and single-course reconciliation

use calsync_domain::{CourseSyncResult, RunStatus, SyncError, SyncRunStats};
use tracing::info;

use crate::context::{AppContext, TrackedRun};
use crate::envelope::ApiResponse;
use crate::utils::command_helpers::execute_command;

/// Run one incremental propagation pass for `term`.
///
/// A second request for a term that already has an active run answers 409.
/// A run whose pipeline failed answers 500 with the run statistics (minus
/// the raw error text) attached as error context; a cancelled run is a success whose statistics say
/// `cancelled`.
pub async fn start_incremental_sync(
    ctx: &AppContext,
    term: &str,
    batch_size: Option<usize>,
) -> ApiResponse<TrackedRun<SyncRunStats>> {
    let command_name = "sync::start_incremental_sync";
    info!(command = command_name, term, ?batch_size, "Executing start_incremental_sync");

    let response = execute_command(command_name, || ctx.runner.run_incremental(term, batch_size)).await;
    match response.data {
        Some(run) if run.outcome.status == RunStatus::Failed => failed_run(run),
        _ => response,
    }
}

/// Reconcile the participants of one course calendar.
///
/// Without `calendar_id` the course's valid mapping is used (404 when it has
/// none). Item-level failures stay inside the returned result.
pub async fn sync_course(
    ctx: &AppContext,
    course_code: &str,
    calendar_id: Option<&str>,
) -> ApiResponse<TrackedRun<CourseSyncResult>> {
    let command_name = "sync::sync_course";
    info!(command = command_name, course_code, ?calendar_id, "Executing sync_course");

    execute_command(command_name, || ctx.runner.run_course(course_code, calendar_id)).await
}

/// The raw pipeline error is logged by `from_error` and stays on the task
/// record; the response context carries the counters only.
fn failed_run(mut run: TrackedRun<SyncRunStats>) -> ApiResponse<TrackedRun<SyncRunStats>> {
    let message = run.outcome.error.take().unwrap_or_else(|| "sync run failed".to_string());
    let context = serde_json::to_value(&run).unwrap_or_default();
    ApiResponse::from_error(&SyncError::Internal(message)).with_context(context)
}
