//! Tracked execution of sync runs
//!
//! Every run owns a task record for its whole lifetime: it is created (taking
//! the business key), started, registered as live and finally finished with
//! its outcome. Nothing here retries on its own; `retry` is an explicit
//! request for a failed or cancelled task.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use calsync_core::{RunControl, SyncRunCoordinator, TaskTracker};
use calsync_domain::constants::BULK_RECONCILE_KEY;
use calsync_domain::{
    validate_term, CourseMapping, CourseSyncResult, ErrorKind, NewTask, Result, RunStatus,
    SyncError, SyncRunStats, TaskKind, TaskRecord, TaskStatus,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::run_registry::RunRegistry;

/// Outcome of a run together with the task that tracked it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedRun<T> {
    pub task_id: String,
    #[serde(flatten)]
    pub outcome: T,
}

/// Per-course results of a bulk reconciliation
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReconcileReport {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub courses: Vec<CourseSyncResult>,
}

impl BulkReconcileReport {
    fn new(courses: Vec<CourseSyncResult>, cancelled: bool) -> Self {
        let succeeded = courses.iter().filter(|course| course.success).count();
        Self { succeeded, failed: courses.len() - succeeded, cancelled, courses }
    }
}

/// Outcome of re-running a failed or cancelled task
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RetriedRun {
    Incremental(TrackedRun<SyncRunStats>),
    Course(TrackedRun<CourseSyncResult>),
    Bulk(TrackedRun<BulkReconcileReport>),
}

/// A task with its children and whether this process is executing it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusView {
    pub task: TaskRecord,
    pub children: Vec<TaskRecord>,
    pub live: bool,
    pub paused: bool,
}

/// Final task status derived from a run outcome
trait TaskOutcome: Serialize {
    fn task_status(&self) -> TaskStatus;
    fn task_error(&self) -> Option<String>;
}

impl TaskOutcome for SyncRunStats {
    fn task_status(&self) -> TaskStatus {
        match self.status {
            RunStatus::Completed => TaskStatus::Completed,
            RunStatus::Cancelled => TaskStatus::Cancelled,
            RunStatus::Failed | RunStatus::Running => TaskStatus::Failed,
        }
    }

    fn task_error(&self) -> Option<String> {
        self.error.clone()
    }
}

impl TaskOutcome for CourseSyncResult {
    fn task_status(&self) -> TaskStatus {
        if self.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }

    fn task_error(&self) -> Option<String> {
        (!self.success).then(|| self.errors.join("; "))
    }
}

impl TaskOutcome for BulkReconcileReport {
    fn task_status(&self) -> TaskStatus {
        if self.cancelled {
            TaskStatus::Cancelled
        } else if self.failed > 0 {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        }
    }

    fn task_error(&self) -> Option<String> {
        (self.failed > 0)
            .then(|| format!("{} of {} courses failed", self.failed, self.courses.len()))
    }
}

/// What a task record asks to be run
enum RunPlan {
    Incremental { term: String, batch_size: usize },
    Course { course_code: String, calendar_id: String },
    Bulk { mappings: Option<Vec<CourseMapping>> },
}

impl RunPlan {
    fn from_task(task: &TaskRecord, default_batch_size: usize) -> Result<Self> {
        match task.kind {
            TaskKind::IncrementalSync => Ok(Self::Incremental {
                term: payload_str(task, "term")?,
                batch_size: task
                    .payload
                    .get("batchSize")
                    .and_then(Value::as_u64)
                    .and_then(|size| usize::try_from(size).ok())
                    .unwrap_or(default_batch_size),
            }),
            TaskKind::CourseReconciliation => Ok(Self::Course {
                course_code: payload_str(task, "courseCode")?,
                calendar_id: payload_str(task, "calendarId")?,
            }),
            TaskKind::BulkReconciliation => {
                let mappings = task
                    .payload
                    .get("mappings")
                    .map(|value| serde_json::from_value(value.clone()))
                    .transpose()
                    .map_err(|err| {
                        SyncError::Internal(format!("task {} has malformed mappings: {err}", task.id))
                    })?;
                Ok(Self::Bulk { mappings })
            }
        }
    }
}

fn payload_str(task: &TaskRecord, key: &str) -> Result<String> {
    task.payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SyncError::Internal(format!("task {} payload has no {key}", task.id)))
}

/// Runs coordinator operations under task tracking
#[derive(Clone)]
pub struct SyncRunner {
    coordinator: Arc<SyncRunCoordinator>,
    tasks: Arc<dyn TaskTracker>,
    runs: Arc<RunRegistry>,
    default_batch_size: usize,
}

impl SyncRunner {
    pub fn new(
        coordinator: Arc<SyncRunCoordinator>,
        tasks: Arc<dyn TaskTracker>,
        runs: Arc<RunRegistry>,
        default_batch_size: usize,
    ) -> Self {
        Self { coordinator, tasks, runs, default_batch_size }
    }

    pub fn runs(&self) -> &RunRegistry {
        &self.runs
    }

    /// Incremental propagation for one term under `incremental:{term}`
    #[instrument(skip(self))]
    pub async fn run_incremental(
        &self,
        term: &str,
        batch_size: Option<usize>,
    ) -> Result<TrackedRun<SyncRunStats>> {
        validate_term(term)?;
        let batch_size = batch_size.unwrap_or(self.default_batch_size);
        if batch_size == 0 {
            return Err(SyncError::Validation("batch size must be at least 1".into()));
        }

        let task = self.tasks.create(NewTask::incremental_sync(term, batch_size)).await?;
        self.execute_incremental(task, term.to_string(), batch_size).await
    }

    /// Reconcile one course; without `calendar_id` the course mapping is used
    #[instrument(skip(self))]
    pub async fn run_course(
        &self,
        course_code: &str,
        calendar_id: Option<&str>,
    ) -> Result<TrackedRun<CourseSyncResult>> {
        let course_code = course_code.trim();
        if course_code.is_empty() {
            return Err(SyncError::Validation("course code must not be empty".into()));
        }
        let calendar_id = match calendar_id.map(str::trim) {
            Some("") => {
                return Err(SyncError::Validation("calendar id must not be empty".into()));
            }
            Some(id) => id.to_string(),
            None => self.coordinator.resolve_mapping(course_code).await?.calendar_id,
        };

        let task =
            self.tasks.create(NewTask::course_reconciliation(course_code, &calendar_id)).await?;
        self.execute_course(task, course_code.to_string(), calendar_id).await
    }

    /// Reconcile the given mappings, or every valid mapping when `None`.
    ///
    /// The parent task holds the bulk key and each course gets a child task
    /// under its own key. A course that is already being reconciled is
    /// reported as failed instead of run twice.
    #[instrument(skip_all, fields(courses = mappings.as_ref().map(Vec::len)))]
    pub async fn run_bulk(
        &self,
        mappings: Option<Vec<CourseMapping>>,
        control: RunControl,
    ) -> Result<TrackedRun<BulkReconcileReport>> {
        let payload = match &mappings {
            Some(mappings) => {
                for mapping in mappings {
                    if mapping.course_code.trim().is_empty() || mapping.calendar_id.trim().is_empty() {
                        return Err(SyncError::Validation(
                            "mappings need a course code and a calendar id".into(),
                        ));
                    }
                }
                json!({ "mappings": mappings })
            }
            None => json!({ "scope": "all" }),
        };

        let task = self
            .tasks
            .create(NewTask {
                kind: TaskKind::BulkReconciliation,
                business_key: BULK_RECONCILE_KEY.to_string(),
                parent_id: None,
                payload,
            })
            .await?;
        self.execute_bulk(task, mappings, control).await
    }

    /// Start a new attempt of a failed or cancelled task and run it
    #[instrument(skip(self))]
    pub async fn retry(&self, task_id: &str) -> Result<RetriedRun> {
        let original = self.tasks.status(task_id).await?;
        let plan = RunPlan::from_task(&original, self.default_batch_size)?;

        let task = self.tasks.retry(task_id).await?;
        info!(task_id, retry_id = %task.id, attempt = task.attempt, "run.retrying");

        match plan {
            RunPlan::Incremental { term, batch_size } => {
                self.execute_incremental(task, term, batch_size).await.map(RetriedRun::Incremental)
            }
            RunPlan::Course { course_code, calendar_id } => {
                self.execute_course(task, course_code, calendar_id).await.map(RetriedRun::Course)
            }
            RunPlan::Bulk { mappings } => {
                self.execute_bulk(task, mappings, RunControl::new()).await.map(RetriedRun::Bulk)
            }
        }
    }

    pub async fn status(&self, task_id: &str) -> Result<RunStatusView> {
        let task = self.tasks.status(task_id).await?;
        let children = self.tasks.children(task_id).await?;
        let control = self.runs.get(task_id);
        Ok(RunStatusView {
            task,
            children,
            live: control.is_some(),
            paused: control.is_some_and(|control| control.is_paused()),
        })
    }

    pub async fn pause(&self, task_id: &str) -> Result<TaskRecord> {
        let task = self.tasks.pause(task_id).await?;
        if let Some(control) = self.runs.get(task_id) {
            control.pause();
        }
        info!(task_id, "run.paused");
        Ok(task)
    }

    pub async fn resume(&self, task_id: &str) -> Result<TaskRecord> {
        let task = self.tasks.resume(task_id).await?;
        if let Some(control) = self.runs.get(task_id) {
            control.resume();
        }
        info!(task_id, "run.resumed");
        Ok(task)
    }

    /// Cancel a task.
    ///
    /// A live run is only signalled; it stops at its next checkpoint and
    /// records `cancelled` itself, so the returned record may still be
    /// active.
    pub async fn cancel(&self, task_id: &str) -> Result<TaskRecord> {
        if let Some(control) = self.runs.get(task_id) {
            control.cancel();
            info!(task_id, "run.cancel_requested");
            return self.tasks.status(task_id).await;
        }
        let task = self.tasks.cancel(task_id).await?;
        info!(task_id, "run.cancelled");
        Ok(task)
    }

    async fn execute_incremental(
        &self,
        task: TaskRecord,
        term: String,
        batch_size: usize,
    ) -> Result<TrackedRun<SyncRunStats>> {
        let coordinator = Arc::clone(&self.coordinator);
        let stats = self
            .track(&task, RunControl::new(), |control| async move {
                coordinator.start_incremental_sync(&term, Some(batch_size), &control).await
            })
            .await?;
        Ok(TrackedRun { task_id: task.id, outcome: stats })
    }

    async fn execute_course(
        &self,
        task: TaskRecord,
        course_code: String,
        calendar_id: String,
    ) -> Result<TrackedRun<CourseSyncResult>> {
        let coordinator = Arc::clone(&self.coordinator);
        let result = self
            .track(&task, RunControl::new(), |control| async move {
                control.checkpoint().await?;
                Ok(coordinator.sync_course(&course_code, &calendar_id).await)
            })
            .await?;
        Ok(TrackedRun { task_id: task.id, outcome: result })
    }

    async fn execute_bulk(
        &self,
        task: TaskRecord,
        mappings: Option<Vec<CourseMapping>>,
        control: RunControl,
    ) -> Result<TrackedRun<BulkReconcileReport>> {
        let runner = self.clone();
        let parent_id = task.id.clone();
        let report = self
            .track(&task, control, |control| async move {
                let mappings = match mappings {
                    Some(mappings) => mappings,
                    None => runner.coordinator.reconciler().get_valid_mappings().await?,
                };
                runner.reconcile_children(&parent_id, mappings, &control).await
            })
            .await?;
        Ok(TrackedRun { task_id: task.id, outcome: report })
    }

    async fn reconcile_children(
        &self,
        parent_id: &str,
        mappings: Vec<CourseMapping>,
        control: &RunControl,
    ) -> Result<BulkReconcileReport> {
        control.checkpoint().await?;

        let mut children = HashMap::with_capacity(mappings.len());
        let mut accepted = Vec::with_capacity(mappings.len());
        let mut rejected = Vec::new();
        for mapping in mappings {
            match self.open_child(parent_id, &mapping).await {
                Ok(child_id) => {
                    children.insert(mapping.course_code.clone(), child_id);
                    accepted.push(mapping);
                }
                Err(err) => {
                    warn!(
                        course_code = %mapping.course_code,
                        calendar_id = %mapping.calendar_id,
                        error = %err,
                        "run.course_rejected"
                    );
                    rejected.push(CourseSyncResult::failure(
                        mapping.course_code,
                        mapping.calendar_id,
                        err.to_string(),
                    ));
                }
            }
        }

        let results = self.coordinator.sync_many(accepted, control).await;
        let cancelled = control.is_cancelled();
        for result in &results {
            let Some(child_id) = children.get(&result.course_code) else {
                continue;
            };
            let status = match (result.success, cancelled) {
                (true, _) => TaskStatus::Completed,
                (false, true) => TaskStatus::Cancelled,
                (false, false) => TaskStatus::Failed,
            };
            self.record(child_id, status, serde_json::to_value(result).ok(), result.task_error())
                .await;
        }

        let mut courses = results;
        courses.extend(rejected);
        Ok(BulkReconcileReport::new(courses, cancelled))
    }

    /// Create and start the child task of one course
    async fn open_child(&self, parent_id: &str, mapping: &CourseMapping) -> Result<String> {
        let child = self
            .tasks
            .create(
                NewTask::course_reconciliation(&mapping.course_code, &mapping.calendar_id)
                    .with_parent(parent_id),
            )
            .await?;

        if let Err(err) = self.tasks.start(&child.id).await {
            if let Err(cancel_err) = self.tasks.cancel(&child.id).await {
                warn!(task_id = %child.id, error = %cancel_err, "run.child_not_released");
            }
            return Err(err);
        }
        Ok(child.id)
    }

    /// Start `task`, run it under `control` and record the outcome
    async fn track<T, F, Fut>(&self, task: &TaskRecord, control: RunControl, run: F) -> Result<T>
    where
        T: TaskOutcome,
        F: FnOnce(RunControl) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.tasks.start(&task.id).await?;
        self.runs.insert(&task.id, control.clone());
        info!(
            task_id = %task.id,
            kind = %task.kind,
            business_key = %task.business_key,
            attempt = task.attempt,
            "run.started"
        );

        let outcome = run(control).await;
        self.runs.remove(&task.id);

        let (status, result, error) = match &outcome {
            Ok(value) => (value.task_status(), serde_json::to_value(value).ok(), value.task_error()),
            Err(err) if err.kind() == ErrorKind::Cancelled => {
                (TaskStatus::Cancelled, None, Some(err.to_string()))
            }
            Err(err) => (TaskStatus::Failed, None, Some(err.to_string())),
        };
        info!(task_id = %task.id, status = %status, "run.finished");
        self.record(&task.id, status, result, error).await;
        outcome
    }

    /// Persist the final status; failures are logged, never returned
    async fn record(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) {
        // A run paused after its last checkpoint completes from `paused`
        if status == TaskStatus::Completed {
            match self.tasks.status(task_id).await {
                Ok(current) if current.status == TaskStatus::Paused => {
                    if let Err(err) = self.tasks.resume(task_id).await {
                        warn!(task_id, error = %err, "run.resume_before_finish_failed");
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(task_id, error = %err, "run.status_unavailable"),
            }
        }

        if let Err(err) = self.tasks.finish(task_id, status, result, error).await {
            warn!(task_id, status = %status, error = %err, "run.outcome_not_recorded");
        }
    }
}
