//! Domain types and models

pub mod participant;
pub mod schedule;
pub mod sync;
pub mod task;

pub use participant::{
    CourseMapping, ExternalGrant, GrantPage, GrantRequest, GrantRole, Participant,
    ParticipantRole,
};
pub use schedule::{
    validate_term, CourseAggregate, CourseDatePair, DayPeriod, PropagationMarker,
    RegenerationSummary, ScheduleRecord,
};
pub use sync::{CourseSyncResult, RemovalSummary, RunStatus, SyncRunStats};
pub use task::{
    course_reconcile_key, incremental_sync_key, NewTask, TaskKind, TaskRecord, TaskStatus,
};
