//! Error classification shared by calsync error types.
//!
//! Errors implement [`ErrorClassification`] so callers can decide uniformly
//! whether a failure is worth retrying and how loudly to report it.

use std::fmt;

/// Classify an error by retryability and severity.
///
/// # Example
///
/// ```rust
/// use calsync_common::error::{ErrorClassification, ErrorSeverity};
///
/// #[derive(Debug)]
/// enum FetchError {
///     Busy,
///     Malformed,
/// }
///
/// impl ErrorClassification for FetchError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, Self::Busy)
///     }
///
///     fn severity(&self) -> ErrorSeverity {
///         match self {
///             Self::Busy => ErrorSeverity::Warning,
///             Self::Malformed => ErrorSeverity::Error,
///         }
///     }
/// }
///
/// assert!(FetchError::Busy.is_retryable());
/// assert_eq!(FetchError::Malformed.severity(), ErrorSeverity::Error);
/// ```
pub trait ErrorClassification {
    /// Transient failures (lock contention, checkout timeouts) that may
    /// succeed when attempted again
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
