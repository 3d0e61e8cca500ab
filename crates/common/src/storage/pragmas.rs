//! Per-connection SQLite pragmas

use rusqlite::Connection;

use super::config::SqlitePoolConfig;
use crate::storage::error::{StorageError, StorageResult};

/// Configure a freshly opened pool connection.
///
/// The propagation stages write from several blocking tasks at once, so WAL
/// and a busy timeout are on by default.
pub fn apply_connection_pragmas(conn: &Connection, config: &SqlitePoolConfig) -> StorageResult<()> {
    let pragma = |name: &str, value: &dyn rusqlite::ToSql| {
        conn.pragma_update(None, name, value)
            .map_err(|e| StorageError::Query(format!("failed to set {name}: {e}")))
    };

    if config.enable_wal {
        pragma("journal_mode", &"WAL")?;
    }
    pragma("synchronous", &"NORMAL")?;
    pragma("foreign_keys", &config.enable_foreign_keys)?;

    conn.busy_timeout(config.busy_timeout)
        .map_err(|e| StorageError::Query(format!("failed to set busy timeout: {e}")))
}
