//! Participant reconciliation
//!
//! Per course: desired participants from rosters, current grants from the
//! calendar service, a by-user-id diff, then batched adds and one-by-one
//! removals. Failures are isolated per batch and per participant.

pub mod diff;
pub mod ports;
pub mod reconciler;

pub use diff::{diff, GrantDiff};
pub use reconciler::{ParticipantReconciler, ReconcilerSettings};
