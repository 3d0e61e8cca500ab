//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_domain_status_conversions;

/// Main error type for calsync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SyncError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Partial batch failure: {failed} of {attempted} items failed")]
    PartialBatchFailure { attempted: usize, failed: usize },

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for calsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Discriminant of [`SyncError`], used for exhaustive mapping at the edges
/// (HTTP status codes, log labels, task tracker records).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    ExternalService,
    PartialBatchFailure,
    ConcurrencyConflict,
    Database,
    Config,
    Cancelled,
    Internal,
}

impl_domain_status_conversions!(ErrorKind {
    Validation => "validation_error",
    NotFound => "not_found",
    ExternalService => "external_service_error",
    PartialBatchFailure => "partial_batch_failure",
    ConcurrencyConflict => "concurrency_conflict",
    Database => "database_error",
    Config => "config_error",
    Cancelled => "cancelled",
    Internal => "internal_error",
});

impl SyncError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ExternalService(_) => ErrorKind::ExternalService,
            Self::PartialBatchFailure { .. } => ErrorKind::PartialBatchFailure,
            Self::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            Self::Database(_) => ErrorKind::Database,
            Self::Config(_) => ErrorKind::Config,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code, e.g. `"validation_error"`
    pub const fn code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Transient failures that a later pass may resolve on its own
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ExternalService(_) | Self::Database(_) | Self::PartialBatchFailure { .. })
    }
}
