//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Participant reconciliation
pub const ADD_BATCH_SIZE: usize = 100;
pub const DEFAULT_COURSE_CONCURRENCY: usize = 5;
pub const DEFAULT_MAX_GRANT_PAGES: usize = 50;

// Incremental propagation
pub const DEFAULT_REMOVAL_BATCH_SIZE: usize = 50;

/// Sessions starting before this hour belong to the morning period.
pub const AFTERNOON_START_HOUR: u32 = 12;

// Database defaults
pub const DEFAULT_DB_PATH: &str = "calsync.db";
pub const DEFAULT_DB_POOL_SIZE: u32 = 8;

// Calendar API client
pub const DEFAULT_CALENDAR_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CALENDAR_MAX_ATTEMPTS: u32 = 3;

// Periodic reconciliation
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 900;

// Business key prefixes
pub const INCREMENTAL_SYNC_KEY_PREFIX: &str = "incremental";
pub const COURSE_RECONCILE_KEY_PREFIX: &str = "reconcile";
pub const BULK_RECONCILE_KEY: &str = "reconcile:all";
