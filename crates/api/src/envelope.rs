//! JSON response envelope returned by every command.
//!
//! `{success, data?, error?, errorDetails?, timestamp}`. Failures carry a
//! stable error code and an HTTP-style status; internal and storage errors
//! never expose their message.

use calsync_domain::{ErrorKind, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

const GENERIC_INTERNAL_MESSAGE: &str = "An unexpected error occurred";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub code: String,
    pub status: u16,
    /// Partial outcome attached to a failed run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, error_details: None, timestamp: Utc::now() }
    }

    pub fn from_error(err: &SyncError) -> Self {
        let kind = err.kind();
        let message = match kind {
            ErrorKind::Database | ErrorKind::Internal | ErrorKind::Config => {
                error!(code = err.code(), error = %err, "internal command failure");
                GENERIC_INTERNAL_MESSAGE.to_string()
            }
            _ => err.to_string(),
        };

        Self {
            success: false,
            data: None,
            error: Some(message),
            error_details: Some(ErrorDetails {
                code: err.code().to_string(),
                status: status_for(kind),
                context: None,
            }),
            timestamp: Utc::now(),
        }
    }

    pub fn from_result(result: calsync_domain::Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::from_error(&err),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        if let Some(details) = self.error_details.as_mut() {
            details.context = Some(context);
        }
        self
    }

    /// 200 on success, otherwise the status of the error kind
    pub fn status(&self) -> u16 {
        self.error_details.as_ref().map_or(200, |details| details.status)
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({
                "success": false,
                "error": format!("failed to serialize response: {err}"),
                "timestamp": Utc::now(),
            })
        })
    }
}

/// HTTP status for each error kind
pub const fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::Validation => 400,
        ErrorKind::NotFound => 404,
        ErrorKind::ConcurrencyConflict | ErrorKind::Cancelled => 409,
        ErrorKind::ExternalService | ErrorKind::PartialBatchFailure => 502,
        ErrorKind::Database | ErrorKind::Config | ErrorKind::Internal => 500,
    }
}
