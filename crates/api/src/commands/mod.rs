//! Command surface of the triggering layer
//!
//! Every command takes the shared [`AppContext`](crate::context::AppContext)
//! and answers with an [`ApiResponse`](crate::envelope::ApiResponse).

pub mod reconcile;
pub mod runs;
pub mod sync;

pub use reconcile::{reconcile_all, sync_many};
pub use runs::{cancel_run, get_run_status, pause_run, resume_run, retry_run};
pub use sync::{start_incremental_sync, sync_course};
