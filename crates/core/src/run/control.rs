//! Cooperative pause and cancellation for sync runs

use std::sync::Arc;

use calsync_domain::{Result, SyncError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Handle shared between a running sync and whoever may pause or cancel it.
///
/// The run calls [`RunControl::checkpoint`] between stages, before each
/// removal batch and before starting each course. Work already started is
/// never interrupted mid-call.
#[derive(Debug, Clone)]
pub struct RunControl {
    token: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self { token: CancellationToken::new(), paused: Arc::new(paused) }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Token cancelled together with this run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Return `Err(Cancelled)` if cancellation was requested; wait while
    /// paused.
    pub async fn checkpoint(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(cancelled());
        }

        let mut paused = self.paused.subscribe();
        while *paused.borrow_and_update() {
            tokio::select! {
                () = self.token.cancelled() => return Err(cancelled()),
                changed = paused.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if self.token.is_cancelled() {
            return Err(cancelled());
        }
        Ok(())
    }
}

fn cancelled() -> SyncError {
    SyncError::Cancelled("run cancelled on request".to_string())
}
