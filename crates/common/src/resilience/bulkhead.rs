//! Bulkhead for bounded fan-out
//!
//! [`Bulkhead::execute_all`] runs every item on its own task with at most
//! `max_concurrent` in flight. Results come back in input order, and a
//! panicking item is reported as a failure for that item only.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use super::{ResilienceError, ResilienceResult};

/// Counters observed over the bulkhead's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadMetrics {
    /// Items that acquired a permit
    pub total_operations: u64,
    /// Items in flight right now
    pub current_concurrent: usize,
    /// Highest number of items observed in flight at once
    pub peak_concurrent: usize,
    pub max_concurrent: usize,
}

impl BulkheadMetrics {
    /// Number of permit waves needed to drain `items` operations
    pub const fn waves_for(&self, items: usize) -> usize {
        items.div_ceil(self.max_concurrent)
    }
}

/// Decrements the in-flight counter when the guarded item ends.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Named pool of `max_concurrent` permits.
///
/// ```rust
/// use calsync_common::resilience::Bulkhead;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bulkhead = Bulkhead::new("lookups", 2)?;
/// let results = bulkhead.execute_all(vec![1, 2, 3], |n| async move { n * 2 }).await;
///
/// let doubled: Vec<i32> = results.into_iter().collect::<Result<_, _>>()?;
/// assert_eq!(doubled, vec![2, 4, 6]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Bulkhead {
    name: &'static str,
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak_concurrent: Arc<AtomicUsize>,
    total_operations: Arc<AtomicU64>,
}

impl Bulkhead {
    pub fn new(name: &'static str, max_concurrent: usize) -> ResilienceResult<Self> {
        if max_concurrent == 0 {
            return Err(ResilienceError::InvalidConfiguration(format!(
                "bulkhead {name}: max_concurrent must be greater than 0"
            )));
        }

        Ok(Self {
            name,
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_concurrent: Arc::new(AtomicUsize::new(0)),
            total_operations: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    async fn acquire(&self) -> ResilienceResult<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ResilienceError::Closed { name: self.name })
    }

    fn enter(&self) -> InFlightGuard {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_concurrent.fetch_max(now, Ordering::AcqRel);
        InFlightGuard { in_flight: Arc::clone(&self.in_flight) }
    }

    /// Run `operation` for every item with at most `max_concurrent` in flight.
    ///
    /// Results are returned in input order. A panicking or aborted item is
    /// reported as [`ResilienceError::TaskFailed`]; siblings are unaffected.
    pub async fn execute_all<I, F, Fut, T>(
        &self,
        items: Vec<I>,
        operation: F,
    ) -> Vec<ResilienceResult<T>>
    where
        I: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        debug!(bulkhead = self.name, items = items.len(), permits = self.max_concurrent, "fan-out");

        let operation = Arc::new(operation);
        let handles: Vec<_> = items
            .into_iter()
            .map(|item| {
                let bulkhead = self.clone();
                let operation = Arc::clone(&operation);
                tokio::spawn(async move {
                    let _permit = bulkhead.acquire().await?;
                    let _guard = bulkhead.enter();
                    Ok(operation(item).await)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(source) => {
                    warn!(bulkhead = self.name, error = %source, "fan-out task did not complete");
                    Err(ResilienceError::TaskFailed { name: self.name, source })
                }
            };
            results.push(outcome);
        }
        results
    }

    pub fn current_concurrent(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> BulkheadMetrics {
        BulkheadMetrics {
            total_operations: self.total_operations.load(Ordering::Acquire),
            current_concurrent: self.current_concurrent(),
            peak_concurrent: self.peak_concurrent.load(Ordering::Acquire),
            max_concurrent: self.max_concurrent,
        }
    }
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.name)
            .field("max_concurrent", &self.max_concurrent)
            .field("current_concurrent", &self.current_concurrent())
            .finish()
    }
}
