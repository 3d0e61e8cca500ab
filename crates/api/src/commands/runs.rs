//! Run inspection and control

use calsync_domain::TaskRecord;

use crate::context::{AppContext, RetriedRun, RunStatusView};
use crate::envelope::ApiResponse;
use crate::utils::command_helpers::execute_command;

pub async fn get_run_status(ctx: &AppContext, task_id: &str) -> ApiResponse<RunStatusView> {
    execute_command("runs::get_run_status", || ctx.runner.status(task_id)).await
}

/// Pause a running task; a live run stops at its next checkpoint
pub async fn pause_run(ctx: &AppContext, task_id: &str) -> ApiResponse<TaskRecord> {
    execute_command("runs::pause_run", || ctx.runner.pause(task_id)).await
}

pub async fn resume_run(ctx: &AppContext, task_id: &str) -> ApiResponse<TaskRecord> {
    execute_command("runs::resume_run", || ctx.runner.resume(task_id)).await
}

pub async fn cancel_run(ctx: &AppContext, task_id: &str) -> ApiResponse<TaskRecord> {
    execute_command("runs::cancel_run", || ctx.runner.cancel(task_id)).await
}

/// Run a failed or cancelled task again as a new attempt
pub async fn retry_run(ctx: &AppContext, task_id: &str) -> ApiResponse<RetriedRun> {
    execute_command("runs::retry_run", || ctx.runner.retry(task_id)).await
}
