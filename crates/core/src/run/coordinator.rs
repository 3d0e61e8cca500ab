//! Sync run coordinator
//!
//! Sequences the propagation stages for one term and fans reconciliation out
//! across courses. Stage failures never escape [`SyncRunCoordinator::start_incremental_sync`];
//! they end up in the returned [`SyncRunStats`].

use std::collections::BTreeSet;
use std::sync::Arc;

use calsync_domain::{
    validate_term, CourseDatePair, CourseMapping, CourseSyncResult, Result, SyncConfig, SyncError,
    SyncRunStats,
};
use tracing::{error, info, instrument, warn};

use super::control::RunControl;
use crate::pipeline::ports::{AggregateRepository, BindingGateway, ScheduleRepository};
use crate::pipeline::{AggregateInvalidator, AggregateRegenerator, BindingRemover, ChangeDetector};
use crate::reconcile::ports::CalendarGrantClient;
use crate::reconcile::{ParticipantReconciler, ReconcilerSettings};
use crate::roster_ports::{CalendarMappingRepository, RosterRepository};

/// Adapters the coordinator is assembled from
#[derive(Clone)]
pub struct CoordinatorPorts {
    pub schedules: Arc<dyn ScheduleRepository>,
    pub aggregates: Arc<dyn AggregateRepository>,
    pub rosters: Arc<dyn RosterRepository>,
    pub bindings: Arc<dyn BindingGateway>,
    pub mappings: Arc<dyn CalendarMappingRepository>,
    pub grants: Arc<dyn CalendarGrantClient>,
}

pub struct SyncRunCoordinator {
    schedules: Arc<dyn ScheduleRepository>,
    mappings: Arc<dyn CalendarMappingRepository>,
    detector: ChangeDetector,
    invalidator: AggregateInvalidator,
    remover: BindingRemover,
    regenerator: AggregateRegenerator,
    reconciler: ParticipantReconciler,
}

impl SyncRunCoordinator {
    pub fn new(ports: CoordinatorPorts) -> Self {
        Self {
            detector: ChangeDetector::new(Arc::clone(&ports.schedules)),
            invalidator: AggregateInvalidator::new(Arc::clone(&ports.aggregates)),
            remover: BindingRemover::new(
                Arc::clone(&ports.rosters),
                Arc::clone(&ports.bindings),
                Arc::clone(&ports.aggregates),
            ),
            regenerator: AggregateRegenerator::new(
                Arc::clone(&ports.schedules),
                Arc::clone(&ports.aggregates),
            ),
            reconciler: ParticipantReconciler::new(
                Arc::clone(&ports.mappings),
                ports.rosters,
                ports.grants,
            ),
            mappings: ports.mappings,
            schedules: ports.schedules,
        }
    }

    pub fn from_config(ports: CoordinatorPorts, config: &SyncConfig) -> Self {
        Self::new(ports)
            .with_removal_batch_size(config.removal_batch_size)
            .with_reconciler_settings(ReconcilerSettings::from(config))
    }

    #[must_use]
    pub fn with_removal_batch_size(mut self, batch_size: usize) -> Self {
        self.remover = self.remover.with_batch_size(batch_size);
        self
    }

    #[must_use]
    pub fn with_reconciler_settings(mut self, settings: ReconcilerSettings) -> Self {
        self.reconciler = self.reconciler.with_settings(settings);
        self
    }

    pub const fn reconciler(&self) -> &ParticipantReconciler {
        &self.reconciler
    }

    /// Run one incremental propagation pass for `term`.
    ///
    /// Only argument validation returns `Err`. Cancellation yields
    /// `status=cancelled`, any other stage error `status=failed`; counters of
    /// the stages that finished are kept in both cases.
    #[instrument(skip(self, control))]
    pub async fn start_incremental_sync(
        &self,
        term: &str,
        batch_size: Option<usize>,
        control: &RunControl,
    ) -> Result<SyncRunStats> {
        validate_term(term)?;
        let batch_size = match batch_size {
            Some(0) => return Err(SyncError::Validation("batch size must be at least 1".into())),
            Some(size) => size,
            None => self.remover.batch_size(),
        };

        let mut stats = SyncRunStats::started(term);
        match self.run_stages(term, batch_size, control, &mut stats).await {
            Ok(()) => stats.complete(),
            Err(SyncError::Cancelled(reason)) => {
                warn!(term, reason = %reason, "coordinator.run_cancelled");
                stats.cancel(reason);
            }
            Err(err) => {
                error!(term, error = %err, code = err.code(), "coordinator.run_failed");
                stats.fail(err.to_string());
            }
        }

        info!(
            term,
            status = %stats.status,
            processed_courses = stats.processed_courses,
            soft_deleted_aggregates = stats.soft_deleted_aggregates,
            deleted_teacher_calendars = stats.deleted_teacher_calendars,
            deleted_student_calendars = stats.deleted_student_calendars,
            new_aggregates = stats.new_aggregates,
            duration_ms = stats.duration_ms().unwrap_or_default(),
            "coordinator.run_finished"
        );
        Ok(stats)
    }

    async fn run_stages(
        &self,
        term: &str,
        batch_size: usize,
        control: &RunControl,
        stats: &mut SyncRunStats,
    ) -> Result<()> {
        control.checkpoint().await?;
        let pairs = self.collect_pairs(term).await?;
        if pairs.is_empty() {
            info!(term, "coordinator.no_changes");
            return Ok(());
        }
        stats.processed_courses =
            pairs.iter().map(|pair| pair.course_code.as_str()).collect::<BTreeSet<_>>().len();

        control.checkpoint().await?;
        stats.soft_deleted_aggregates = self.invalidator.invalidate(term, &pairs).await?;

        let removal = self.remover.remove_in_batches(term, &pairs, batch_size, control).await?;
        stats.deleted_teacher_calendars = removal.teacher_deletions;
        stats.deleted_student_calendars = removal.student_deletions;
        if removal.failed_deletions > 0 {
            warn!(term, failed = removal.failed_deletions, "coordinator.binding_failures");
        }

        control.checkpoint().await?;
        let regenerated = self.regenerator.regenerate(term).await?;
        stats.new_aggregates = regenerated.total;
        stats.soft_deleted_aggregates += regenerated.retired;
        Ok(())
    }

    /// Newly changed pairs plus pairs an interrupted run left pending
    async fn collect_pairs(&self, term: &str) -> Result<Vec<CourseDatePair>> {
        let mut pairs = self.detector.detect_changes(term).await?;
        let pending = self.schedules.find_pending_pairs(term).await?;
        if !pending.is_empty() {
            info!(term, pending = pending.len(), "coordinator.resuming_pending_pairs");
            pairs.extend(pending);
            pairs.sort();
            pairs.dedup();
        }
        Ok(pairs)
    }

    /// Reconcile a single course calendar
    pub async fn sync_course(&self, course_code: &str, calendar_id: &str) -> CourseSyncResult {
        self.reconciler.sync_course(course_code, calendar_id).await
    }

    /// Valid mapping of a course, `NotFound` if it has none
    pub async fn resolve_mapping(&self, course_code: &str) -> Result<CourseMapping> {
        self.mappings.find_mapping(course_code).await?.ok_or_else(|| {
            SyncError::NotFound(format!("no calendar mapping for course {course_code}"))
        })
    }

    pub async fn sync_many(
        &self,
        mappings: Vec<CourseMapping>,
        control: &RunControl,
    ) -> Vec<CourseSyncResult> {
        self.reconciler.sync_many(mappings, control).await
    }

    /// Reconcile every course that has a valid calendar mapping
    #[instrument(skip(self, control))]
    pub async fn reconcile_all(&self, control: &RunControl) -> Result<Vec<CourseSyncResult>> {
        control.checkpoint().await?;
        let mappings = self.reconciler.get_valid_mappings().await?;
        let results = self.reconciler.sync_many(mappings, control).await;

        let failed = results.iter().filter(|result| !result.success).count();
        info!(courses = results.len(), failed, "coordinator.reconcile_all_finished");
        Ok(results)
    }
}
