//! Scheduler error types

use std::time::Duration;

use calsync_domain::SyncError;
use thiserror::Error;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler already running")]
    AlreadyRunning,

    #[error("Scheduler not running")]
    NotRunning,

    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let sync_err = match err {
            SchedulerError::AlreadyRunning => SyncError::ConcurrencyConflict(err.to_string()),
            SchedulerError::NotRunning => SyncError::Validation(err.to_string()),
            SchedulerError::InvalidConfig(_) => SyncError::Config(err.to_string()),
            SchedulerError::Timeout { .. } | SchedulerError::TaskJoinFailed(_) => {
                SyncError::Internal(err.to_string())
            }
        };
        InfraError(sync_err)
    }
}

impl From<SchedulerError> for SyncError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoinFailed(err.to_string())
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
