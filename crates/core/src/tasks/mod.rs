//! Task tracking port and run-status mapping

pub mod ports;

use calsync_domain::{RunStatus, TaskStatus};

pub use ports::TaskTracker;

/// Tracker status recorded for a finished incremental run
pub const fn task_status_for(status: RunStatus) -> TaskStatus {
    match status {
        RunStatus::Running => TaskStatus::Running,
        RunStatus::Completed => TaskStatus::Completed,
        RunStatus::Failed => TaskStatus::Failed,
        RunStatus::Cancelled => TaskStatus::Cancelled,
    }
}
