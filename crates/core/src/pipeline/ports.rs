//! Port interfaces for the incremental propagation pipeline

use async_trait::async_trait;
use calsync_domain::{CourseAggregate, CourseDatePair, Participant, Result, ScheduleRecord};

/// Read access to timetable source rows
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Distinct (course, date) pairs whose rows are still unpropagated
    async fn find_unpropagated_pairs(&self, term: &str) -> Result<Vec<CourseDatePair>>;

    /// Pairs left at soft_delete_pending by an interrupted run
    async fn find_pending_pairs(&self, term: &str) -> Result<Vec<CourseDatePair>>;

    /// Every source row of the term, including upstream tombstones
    async fn find_term_records(&self, term: &str) -> Result<Vec<ScheduleRecord>>;
}

/// Write access to materialized aggregates and propagation markers
#[async_trait]
pub trait AggregateRepository: Send + Sync {
    /// Mark the pair's live aggregates and unpropagated source rows as
    /// soft_delete_pending. Returns the number of aggregate rows affected.
    async fn soft_delete_for_pair(&self, term: &str, pair: &CourseDatePair) -> Result<usize>;

    /// Advance every pending row of the given pairs to soft_delete_done in one
    /// update. Returns the number of rows advanced.
    async fn complete_pairs(&self, term: &str, pairs: &[CourseDatePair]) -> Result<usize>;

    /// Natural-key upsert. Returns the number of rows created or changed.
    async fn upsert_aggregates(&self, aggregates: &[CourseAggregate]) -> Result<usize>;

    /// Soft-delete the term's live aggregates whose natural key is not among
    /// `current`. Returns the number of rows retired.
    async fn retire_stale_aggregates(
        &self,
        term: &str,
        current: &[CourseAggregate],
    ) -> Result<usize>;
}

/// Removes a user's external calendar entries for one course session
#[async_trait]
pub trait BindingGateway: Send + Sync {
    /// Returns `true` when at least one binding was deleted
    async fn delete_binding(
        &self,
        term: &str,
        pair: &CourseDatePair,
        participant: &Participant,
    ) -> Result<bool>;
}
