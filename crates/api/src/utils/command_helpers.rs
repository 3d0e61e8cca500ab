//! Command execution helpers

use std::future::Future;
use std::time::Instant;

use calsync_domain::Result as DomainResult;
use tracing::debug;

use crate::envelope::ApiResponse;
use crate::utils::logging::{error_label, log_command_execution};

/// Time a command, log its outcome and wrap the result in the envelope.
pub async fn execute_command<F, Fut, T>(command_name: &str, command_fn: F) -> ApiResponse<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    let start = Instant::now();
    let result = command_fn().await;

    let elapsed = start.elapsed();
    log_command_execution(command_name, elapsed, result.is_ok());
    if let Err(err) = &result {
        debug!(command = command_name, error_type = error_label(err), "command error");
    }

    ApiResponse::from_result(result)
}
