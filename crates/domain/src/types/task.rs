//! Task tracker records and business keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{COURSE_RECONCILE_KEY_PREFIX, INCREMENTAL_SYNC_KEY_PREFIX};
use crate::impl_domain_status_conversions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    IncrementalSync,
    CourseReconciliation,
    BulkReconciliation,
}

impl_domain_status_conversions!(TaskKind {
    IncrementalSync => "incremental_sync",
    CourseReconciliation => "course_reconciliation",
    BulkReconciliation => "bulk_reconciliation",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl_domain_status_conversions!(TaskStatus {
    Pending => "pending",
    Running => "running",
    Paused => "paused",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl TaskStatus {
    /// Active tasks hold their business key
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Paused)
    }

    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Failed and cancelled tasks may be retried explicitly
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running | Self::Cancelled)
            | (Self::Running, Self::Paused | Self::Completed | Self::Failed | Self::Cancelled)
            | (Self::Paused, Self::Running | Self::Cancelled | Self::Failed) => true,
            _ => false,
        }
    }
}

/// Request to create a tracked task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub kind: TaskKind,
    pub business_key: String,
    pub parent_id: Option<String>,
    pub payload: Value,
}

impl NewTask {
    pub fn incremental_sync(term: &str, batch_size: usize) -> Self {
        Self {
            kind: TaskKind::IncrementalSync,
            business_key: incremental_sync_key(term),
            parent_id: None,
            payload: serde_json::json!({ "term": term, "batchSize": batch_size }),
        }
    }

    pub fn course_reconciliation(course_code: &str, calendar_id: &str) -> Self {
        Self {
            kind: TaskKind::CourseReconciliation,
            business_key: course_reconcile_key(course_code),
            parent_id: None,
            payload: serde_json::json!({ "courseCode": course_code, "calendarId": calendar_id }),
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Persisted task state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub kind: TaskKind,
    pub business_key: String,
    pub status: TaskStatus,
    pub payload: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn incremental_sync_key(term: &str) -> String {
    format!("{INCREMENTAL_SYNC_KEY_PREFIX}:{term}")
}

pub fn course_reconcile_key(course_code: &str) -> String {
    format!("{COURSE_RECONCILE_KEY_PREFIX}:{course_code}")
}
