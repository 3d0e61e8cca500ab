//! Change detection for one term

use std::sync::Arc;

use calsync_domain::{CourseDatePair, Result};
use tracing::{debug, instrument};

use super::ports::ScheduleRepository;

/// Finds (course, date) pairs whose source rows have not been propagated
pub struct ChangeDetector {
    schedules: Arc<dyn ScheduleRepository>,
}

impl ChangeDetector {
    pub fn new(schedules: Arc<dyn ScheduleRepository>) -> Self {
        Self { schedules }
    }

    /// Distinct, ordered pairs carrying the unpropagated marker. Pure read.
    #[instrument(skip(self))]
    pub async fn detect_changes(&self, term: &str) -> Result<Vec<CourseDatePair>> {
        let mut pairs = self.schedules.find_unpropagated_pairs(term).await?;
        pairs.sort();
        pairs.dedup();

        debug!(term, pairs = pairs.len(), "change_detector.detected");
        Ok(pairs)
    }
}
