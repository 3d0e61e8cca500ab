//! Database implementations

mod columns;

pub mod aggregate_repository;
pub mod binding_repository;
pub mod manager;
pub mod mapping_repository;
pub mod roster_repository;
pub mod schedule_repository;
pub mod task_repository;

pub use aggregate_repository::SqliteAggregateRepository;
pub use binding_repository::{CalendarBinding, SqliteBindingRepository};
pub use manager::DbManager;
pub use mapping_repository::SqliteMappingRepository;
pub use roster_repository::SqliteRosterRepository;
pub use schedule_repository::SqliteScheduleRepository;
pub use task_repository::SqliteTaskTracker;
