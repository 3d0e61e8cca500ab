//! Sync run sequencing and cooperative run control

pub mod control;
pub mod coordinator;

pub use control::RunControl;
pub use coordinator::{CoordinatorPorts, SyncRunCoordinator};
