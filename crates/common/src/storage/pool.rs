//! SQLite connection pool
//!
//! r2d2-based pooling for plain SQLite databases. Schema management stays
//! with the application; this layer only hands out configured connections.

use std::path::{Path, PathBuf};

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::config::SqlitePoolConfig;
use super::pragmas::apply_connection_pragmas;
use crate::storage::error::{StorageError, StorageResult};

/// A pooled SQLite connection
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

/// Snapshot of pool health
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolHealth {
    pub healthy: bool,
    pub connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
    pub message: Option<String>,
}

/// SQLite connection pool
///
/// # Features
/// - Connection pooling (default: 10 connections)
/// - WAL mode and foreign keys applied on every new connection
/// - Connection timeout handling
/// - Health checks
#[derive(Debug, Clone)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: SqlitePoolConfig,
    path: PathBuf,
}

impl SqlitePool {
    /// Create a new connection pool for the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the file can't be
    /// opened, or a test connection cannot be acquired.
    #[instrument(fields(db_path = ?path, pool_size = config.max_size))]
    pub fn new(path: &Path, config: SqlitePoolConfig) -> StorageResult<Self> {
        config.validate()?;
        info!("Creating SQLite connection pool");

        let pool_config = config.clone();
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            apply_connection_pragmas(conn, &pool_config)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!(error = %e, "Failed to create connection pool");
                StorageError::Connection(format!("Failed to create pool: {e}"))
            })?;

        debug!(max_size = config.max_size, "SQLite pool ready");
        Ok(Self { pool, config, path: path.to_path_buf() })
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> StorageResult<SqliteConnection> {
        self.pool.get().map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("timed out") {
                warn!(timeout = ?self.config.connection_timeout, "Connection timeout");
                StorageError::Timeout(self.config.connection_timeout.as_secs())
            } else {
                warn!(error = %message, "Connection error");
                StorageError::Connection(format!("Failed to get connection: {message}"))
            }
        })
    }

    /// Check that a connection can be acquired and report pool state
    pub fn health_check(&self) -> PoolHealth {
        let state = self.pool.state();
        match self.pool.get() {
            Ok(_conn) => PoolHealth {
                healthy: true,
                connections: state.connections,
                idle_connections: state.idle_connections,
                max_connections: self.config.max_size,
                message: None,
            },
            Err(e) => PoolHealth {
                healthy: false,
                connections: state.connections,
                idle_connections: state.idle_connections,
                max_connections: self.config.max_size,
                message: Some(format!("Pool unhealthy: {e}")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_pool_creation() {
        let temp_dir = TempDir::new().unwrap();
        let pool =
            SqlitePool::new(&temp_dir.path().join("test.db"), SqlitePoolConfig::default()).unwrap();

        let conn = pool.get_connection().unwrap();
        conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", []).unwrap();
    }

    #[test]
    fn test_concurrent_connections() {
        let temp_dir = TempDir::new().unwrap();
        let pool = Arc::new(
            SqlitePool::new(&temp_dir.path().join("test.db"), SqlitePoolConfig::default())
                .unwrap(),
        );

        pool.get_connection()
            .unwrap()
            .execute("CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT)", [])
            .unwrap();

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let conn = pool.get_connection().unwrap();
                    conn.execute("INSERT INTO test (value) VALUES (?1)", [format!("thread_{i}")])
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let conn = pool.get_connection().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM test", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_health_check() {
        let temp_dir = TempDir::new().unwrap();
        let pool =
            SqlitePool::new(&temp_dir.path().join("test.db"), SqlitePoolConfig::with_max_size(3))
                .unwrap();

        let health = pool.health_check();
        assert!(health.healthy);
        assert_eq!(health.max_connections, 3);
        assert!(health.message.is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result =
            SqlitePool::new(&temp_dir.path().join("test.db"), SqlitePoolConfig::with_max_size(0));
        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
    }
}
