//! Results and statistics reported by sync runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/* -------------------------------------------------------------------------- */
/* Course reconciliation */
/* -------------------------------------------------------------------------- */

/// Outcome of reconciling one course calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSyncResult {
    pub course_code: String,
    pub calendar_id: String,
    pub success: bool,
    pub added_count: usize,
    pub removed_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl CourseSyncResult {
    pub fn new(course_code: impl Into<String>, calendar_id: impl Into<String>) -> Self {
        Self {
            course_code: course_code.into(),
            calendar_id: calendar_id.into(),
            success: true,
            added_count: 0,
            removed_count: 0,
            failed_count: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// A course that could not be reconciled at all
    pub fn failure(
        course_code: impl Into<String>,
        calendar_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(course_code, calendar_id);
        result.success = false;
        result.errors.push(error.into());
        result
    }
}

/* -------------------------------------------------------------------------- */
/* Binding removal */
/* -------------------------------------------------------------------------- */

/// Counts produced by the external binding remover
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalSummary {
    pub teacher_deletions: usize,
    pub student_deletions: usize,
    pub failed_deletions: usize,
    pub completed_rows: usize,
}

/* -------------------------------------------------------------------------- */
/* Incremental run */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl_domain_status_conversions!(RunStatus {
    Running => "running",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

/// Statistics of one incremental propagation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunStats {
    pub term: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub processed_courses: usize,
    pub soft_deleted_aggregates: usize,
    pub deleted_teacher_calendars: usize,
    pub deleted_student_calendars: usize,
    pub new_aggregates: usize,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncRunStats {
    pub fn started(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            start_time: Utc::now(),
            end_time: None,
            processed_courses: 0,
            soft_deleted_aggregates: 0,
            deleted_teacher_calendars: 0,
            deleted_student_calendars: 0,
            new_aggregates: 0,
            status: RunStatus::Running,
            error: None,
        }
    }

    fn finish(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.end_time = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.finish(RunStatus::Completed, None);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.finish(RunStatus::Failed, Some(error.into()));
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.finish(RunStatus::Cancelled, Some(reason.into()));
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time.map(|end| (end - self.start_time).num_milliseconds())
    }
}
