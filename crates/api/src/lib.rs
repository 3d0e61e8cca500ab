//! # calsync API
//!
//! Triggering layer - commands, response envelope and the binary entry point.
//!
//! This crate contains:
//! - Commands for incremental sync, reconciliation and run control
//! - Application context (dependency injection)
//! - The JSON response envelope and logging setup
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod commands;
pub mod context;
pub mod envelope;
pub mod utils;

// Re-export for convenience
pub use commands::*;
pub use context::*;
pub use envelope::{status_for, ApiResponse, ErrorDetails};
