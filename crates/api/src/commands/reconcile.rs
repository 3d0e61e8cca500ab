//! Bulk participant reconciliation

use calsync_core::RunControl;
use calsync_domain::CourseMapping;
use tracing::info;

use crate::context::{AppContext, BulkReconcileReport, TrackedRun};
use crate::envelope::ApiResponse;
use crate::utils::command_helpers::execute_command;

/// Reconcile the given course mappings.
///
/// Courses fail independently; the envelope is a success as long as the bulk
/// run itself could be tracked.
pub async fn sync_many(
    ctx: &AppContext,
    mappings: Vec<CourseMapping>,
) -> ApiResponse<TrackedRun<BulkReconcileReport>> {
    let command_name = "reconcile::sync_many";
    info!(command = command_name, courses = mappings.len(), "Executing sync_many");

    execute_command(command_name, || ctx.runner.run_bulk(Some(mappings), RunControl::new())).await
}

/// Reconcile every course with a valid calendar mapping
pub async fn reconcile_all(ctx: &AppContext) -> ApiResponse<TrackedRun<BulkReconcileReport>> {
    let command_name = "reconcile::reconcile_all";
    info!(command = command_name, "Executing reconcile_all");

    execute_command(command_name, || ctx.runner.run_bulk(None, RunControl::new())).await
}
