//! Aggregate invalidation

use std::sync::Arc;

use calsync_domain::{CourseDatePair, Result};
use tracing::{debug, info, instrument};

use super::ports::AggregateRepository;

/// Marks the aggregates of changed pairs as soft-deletion pending
pub struct AggregateInvalidator {
    aggregates: Arc<dyn AggregateRepository>,
}

impl AggregateInvalidator {
    pub fn new(aggregates: Arc<dyn AggregateRepository>) -> Self {
        Self { aggregates }
    }

    /// Returns the total number of aggregate rows moved to pending.
    ///
    /// Rows already pending or done are not touched, so a repeated call for
    /// the same pairs returns 0.
    #[instrument(skip(self, pairs), fields(pairs = pairs.len()))]
    pub async fn invalidate(&self, term: &str, pairs: &[CourseDatePair]) -> Result<usize> {
        let mut total = 0usize;
        for pair in pairs {
            let affected = self.aggregates.soft_delete_for_pair(term, pair).await?;
            debug!(
                course_code = %pair.course_code,
                session_date = %pair.session_date,
                affected,
                "invalidator.pair_marked"
            );
            total = total.saturating_add(affected);
        }

        info!(term, soft_deleted = total, "invalidator.completed");
        Ok(total)
    }
}
