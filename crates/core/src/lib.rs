//! # calsync Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits)
//! - The incremental propagation pipeline (detect, invalidate, remove,
//!   regenerate)
//! - Participant reconciliation (diff and bounded batch apply)
//! - The sync run coordinator and run control
//!
//! ## Architecture Principles
//! - Only depends on `calsync-common` and `calsync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod pipeline;
pub mod reconcile;
pub mod run;
pub mod tasks;

// Infrastructure ports shared by pipeline and reconciliation
pub mod roster_ports;

pub use pipeline::ports::{AggregateRepository, BindingGateway, ScheduleRepository};
pub use pipeline::{
    derive_aggregates, AggregateInvalidator, AggregateRegenerator, BindingRemover, ChangeDetector,
};
pub use reconcile::diff::{diff, GrantDiff};
pub use reconcile::ports::CalendarGrantClient;
pub use reconcile::{ParticipantReconciler, ReconcilerSettings};
pub use roster_ports::{CalendarMappingRepository, RosterRepository};
pub use run::{CoordinatorPorts, RunControl, SyncRunCoordinator};
pub use tasks::ports::TaskTracker;
