//! Database connection manager backed by the shared SQLite pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use calsync_common::storage::{SqliteConnection, SqlitePool, SqlitePoolConfig};
use calsync_common::{ErrorClassification, ErrorSeverity, StorageError, StorageResult};
use calsync_domain::{DatabaseConfig, Result, SyncError};
use rusqlite::params;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::errors::InfraError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");
const CHECKOUT_ATTEMPTS: u32 = 3;
const CHECKOUT_BACKOFF: Duration = Duration::from_millis(25);

/// Database manager that wraps a [`SqlitePool`].
pub struct DbManager {
    pool: Arc<SqlitePool>,
    path: PathBuf,
}

impl DbManager {
    /// Open (or create) the database file with the given pool size.
    pub fn new<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let config = SqlitePoolConfig::with_max_size(pool_size.max(1));
        let pool = SqlitePool::new(&path, config).map_err(map_storage_error)?;

        info!(db_path = %path.display(), max_connections = pool_size.max(1), "sqlite pool initialised");

        Ok(Self { pool: Arc::new(pool), path })
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::new(&config.path, config.pool_size)
    }

    /// Borrow the underlying pool.
    pub fn pool(&self) -> &Arc<SqlitePool> {
        &self.pool
    }

    /// Acquire a connection from the pool, retrying transient checkout failures.
    pub fn get_connection(&self) -> Result<SqliteConnection> {
        with_storage_retry(|| self.pool.get_connection()).map_err(map_storage_error)
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
            params![SCHEMA_VERSION],
        )
        .map_err(map_sql_error)?;
        info!(version = SCHEMA_VERSION, "schema ready");
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire a connection and run a trivial query.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(map_sql_error)?;
        Ok(())
    }
}

pub(crate) fn map_sql_error(err: rusqlite::Error) -> SyncError {
    SyncError::from(InfraError::from(err))
}

/// Run `op` up to [`CHECKOUT_ATTEMPTS`] times while it fails with a retryable
/// storage error. Called from blocking contexts only.
pub(crate) fn with_storage_retry<T>(
    mut op: impl FnMut() -> StorageResult<T>,
) -> StorageResult<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < CHECKOUT_ATTEMPTS => {
                warn!(attempt, severity = %err.severity(), error = %err, "retrying storage operation");
                std::thread::sleep(CHECKOUT_BACKOFF * attempt);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn map_storage_error(err: StorageError) -> SyncError {
    match err.severity() {
        ErrorSeverity::Critical | ErrorSeverity::Error => error!(error = %err, "storage failure"),
        ErrorSeverity::Warning | ErrorSeverity::Info => warn!(error = %err, "storage failure"),
    }
    SyncError::from(InfraError::from(err))
}

pub(crate) fn map_join_error(err: JoinError) -> SyncError {
    if err.is_cancelled() {
        SyncError::Internal("blocking database task cancelled".into())
    } else {
        SyncError::Internal(format!("blocking database task panicked: {err}"))
    }
}
