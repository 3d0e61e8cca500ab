//! Resilience patterns for bounded concurrency
//!
//! - **Bulkhead**: fans work out over a fixed, named permit count while
//!   isolating failures per item.

pub mod bulkhead;

use thiserror::Error;
use tokio::task::JoinError;

pub use bulkhead::{Bulkhead, BulkheadMetrics};

/// Errors produced by the bulkhead around one item.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The permit pool was closed before the item could start
    #[error("bulkhead {name} closed")]
    Closed { name: &'static str },

    /// The item's task panicked or was aborted
    #[error("task in bulkhead {name} did not complete")]
    TaskFailed {
        name: &'static str,
        #[source]
        source: JoinError,
    },

    #[error("invalid bulkhead configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;
