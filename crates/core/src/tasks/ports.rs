//! Port interface for the hierarchical task tracker

use async_trait::async_trait;
use calsync_domain::{NewTask, Result, TaskRecord, TaskStatus};
use serde_json::Value;

/// Persistent record of triggered runs.
///
/// At most one active task (pending, running or paused) may hold a given
/// business key; `create` and `retry` return `ConcurrencyConflict` otherwise.
/// Status changes follow [`TaskStatus::can_transition_to`] and return
/// `Validation` when not allowed.
#[async_trait]
pub trait TaskTracker: Send + Sync {
    async fn create(&self, task: NewTask) -> Result<TaskRecord>;

    /// Current record; `NotFound` for unknown ids
    async fn status(&self, task_id: &str) -> Result<TaskRecord>;

    async fn start(&self, task_id: &str) -> Result<TaskRecord>;

    async fn pause(&self, task_id: &str) -> Result<TaskRecord>;

    async fn resume(&self, task_id: &str) -> Result<TaskRecord>;

    async fn cancel(&self, task_id: &str) -> Result<TaskRecord>;

    /// New pending task copying payload and parent of a failed or cancelled
    /// one, with `attempt + 1`. Never called automatically.
    async fn retry(&self, task_id: &str) -> Result<TaskRecord>;

    /// Record the final status together with a result or an error message
    async fn finish(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<TaskRecord>;

    /// Direct children of a task, oldest first
    async fn children(&self, parent_id: &str) -> Result<Vec<TaskRecord>>;
}
