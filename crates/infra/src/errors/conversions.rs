//! Conversions from external infrastructure errors into domain errors.

use calsync_common::StorageError;
use calsync_domain::SyncError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SyncError);

impl From<InfraError> for SyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SyncError> for InfraError {
    fn from(value: SyncError) -> Self {
        Self(value)
    }
}

trait IntoSyncError {
    fn into_sync_error(self) -> SyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → SyncError */
/* -------------------------------------------------------------------------- */

impl IntoSyncError for SqlError {
    fn into_sync_error(self) -> SyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => SyncError::Database("database is busy".into()),
                    (ErrorCode::DatabaseLocked, _) => {
                        SyncError::Database("database is locked".into())
                    }
                    // SQLITE_CONSTRAINT_UNIQUE
                    (ErrorCode::ConstraintViolation, 2067) => {
                        SyncError::ConcurrencyConflict(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        SyncError::Database("foreign key constraint violation".into())
                    }
                    _ => SyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => SyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                SyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                SyncError::Database(format!("invalid column type for {name}: {ty}"))
            }
            RE::InvalidParameterName(parameter_name) => {
                SyncError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidQuery => SyncError::Database("invalid SQL query".into()),
            other => SyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        Self(value.into_sync_error())
    }
}

/* -------------------------------------------------------------------------- */
/* StorageError / r2d2::Error → SyncError */
/* -------------------------------------------------------------------------- */

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Rusqlite(sql_err) => Self::from(sql_err),
            StorageError::InvalidConfig(message) => Self(SyncError::Config(message)),
            other => Self(SyncError::Database(other.to_string())),
        }
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        Self(SyncError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SyncError */
/* -------------------------------------------------------------------------- */

impl IntoSyncError for HttpError {
    fn into_sync_error(self) -> SyncError {
        if self.is_timeout() {
            return SyncError::ExternalService("HTTP request timed out".into());
        }

        if self.is_connect() {
            return SyncError::ExternalService("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                404 => SyncError::NotFound(message),
                409 => SyncError::ConcurrencyConflict(message),
                _ => SyncError::ExternalService(message),
            };
        }

        if self.is_decode() {
            return SyncError::ExternalService(format!("invalid response body: {self}"));
        }

        SyncError::ExternalService(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_sync_error())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json / url */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        Self(SyncError::Internal(format!("JSON serialization failed: {value}")))
    }
}

impl From<url::ParseError> for InfraError {
    fn from(value: url::ParseError) -> Self {
        Self(SyncError::Config(format!("invalid URL: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
