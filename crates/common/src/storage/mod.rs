//! SQLite storage primitives
//!
//! Provides an r2d2-backed SQLite connection pool with per-connection
//! pragmas and a storage error type that plugs into
//! [`ErrorClassification`](crate::error::ErrorClassification).

pub mod config;
pub mod error;
pub mod pool;
pub mod pragmas;

pub use config::SqlitePoolConfig;
pub use error::{StorageError, StorageResult};
pub use pool::{PoolHealth, SqliteConnection, SqlitePool};
pub use pragmas::apply_connection_pragmas;
