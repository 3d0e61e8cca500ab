//! # calsync Domain
//!
//! Business domain types and models for calsync.
//!
//! This crate contains:
//! - Timetable types (schedule records, aggregates, propagation markers)
//! - Participant and calendar grant types
//! - Sync result, run statistics and task tracking types
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other calsync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
