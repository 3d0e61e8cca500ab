//! External binding removal with a per-batch barrier

use std::sync::Arc;

use calsync_domain::constants::DEFAULT_REMOVAL_BATCH_SIZE;
use calsync_domain::{CourseDatePair, ParticipantRole, RemovalSummary, Result};
use tracing::{debug, info, instrument, warn};

use super::ports::{AggregateRepository, BindingGateway};
use crate::roster_ports::RosterRepository;
use crate::run::RunControl;

/// Deletes the calendar bindings of every teacher and student tied to a
/// changed pair, then advances the pairs' markers.
///
/// Pairs are processed sequentially in batches of `batch_size`. Markers of a
/// batch move from pending to done only after every pair of that batch has
/// been processed. A failed deletion is logged and counted; it never aborts
/// the batch.
pub struct BindingRemover {
    rosters: Arc<dyn RosterRepository>,
    gateway: Arc<dyn BindingGateway>,
    aggregates: Arc<dyn AggregateRepository>,
    batch_size: usize,
}

impl BindingRemover {
    pub fn new(
        rosters: Arc<dyn RosterRepository>,
        gateway: Arc<dyn BindingGateway>,
        aggregates: Arc<dyn AggregateRepository>,
    ) -> Self {
        Self { rosters, gateway, aggregates, batch_size: DEFAULT_REMOVAL_BATCH_SIZE }
    }

    /// Pairs per barrier; values below 1 are treated as 1
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Remove bindings for all pairs using the configured batch size.
    pub async fn remove(
        &self,
        term: &str,
        pairs: &[CourseDatePair],
        control: &RunControl,
    ) -> Result<RemovalSummary> {
        self.remove_in_batches(term, pairs, self.batch_size, control).await
    }

    /// Remove bindings with an explicit batch size for this call.
    ///
    /// Roster lookups and the barrier update propagate their errors; pairs of
    /// an unfinished batch stay pending and are resumed by the next run.
    #[instrument(skip(self, pairs, control), fields(pairs = pairs.len()))]
    pub async fn remove_in_batches(
        &self,
        term: &str,
        pairs: &[CourseDatePair],
        batch_size: usize,
        control: &RunControl,
    ) -> Result<RemovalSummary> {
        let mut summary = RemovalSummary::default();

        for batch in pairs.chunks(batch_size.max(1)) {
            control.checkpoint().await?;

            for pair in batch {
                self.remove_pair(term, pair, &mut summary).await?;
            }

            let advanced = self.aggregates.complete_pairs(term, batch).await?;
            summary.completed_rows = summary.completed_rows.saturating_add(advanced);
            debug!(term, batch = batch.len(), advanced, "binding_remover.barrier_passed");
        }

        info!(
            term,
            teacher_deletions = summary.teacher_deletions,
            student_deletions = summary.student_deletions,
            failed_deletions = summary.failed_deletions,
            "binding_remover.completed"
        );
        Ok(summary)
    }

    async fn remove_pair(
        &self,
        term: &str,
        pair: &CourseDatePair,
        summary: &mut RemovalSummary,
    ) -> Result<()> {
        let teachers = self.rosters.teachers_for_pair(term, pair).await?;
        let students = self.rosters.students_for_pair(term, pair).await?;

        for participant in teachers.iter().chain(students.iter()) {
            match self.gateway.delete_binding(term, pair, participant).await {
                Ok(true) => match participant.role {
                    ParticipantRole::Teacher => {
                        summary.teacher_deletions = summary.teacher_deletions.saturating_add(1);
                    }
                    ParticipantRole::Student => {
                        summary.student_deletions = summary.student_deletions.saturating_add(1);
                    }
                },
                Ok(false) => {
                    debug!(
                        course_code = %pair.course_code,
                        user_id = %participant.user_id,
                        "binding_remover.nothing_to_delete"
                    );
                }
                Err(err) => {
                    summary.failed_deletions = summary.failed_deletions.saturating_add(1);
                    warn!(
                        course_code = %pair.course_code,
                        session_date = %pair.session_date,
                        user_id = %participant.user_id,
                        role = %participant.role,
                        error = %err,
                        "binding_remover.delete_failed"
                    );
                }
            }
        }
        Ok(())
    }
}
