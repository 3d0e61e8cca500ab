//! # calsync infrastructure
//!
//! Implementations of the ports defined in `calsync-core`:
//! - SQLite repositories for schedules, aggregates, rosters, mappings,
//!   bindings and tracked tasks
//! - HTTP client with retry and the calendar grant/event adapter
//! - Configuration loading
//! - Periodic reconciliation scheduling
//!
//! All I/O lives here; `calsync-core` stays pure.

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod scheduling;

pub use database::*;
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use integrations::calendar::{CalendarApiClient, CalendarBindingGateway};
pub use scheduling::{
    ReconcileScheduler, ReconcileSchedulerConfig, ScheduledJob, SchedulerError, SchedulerResult,
};
