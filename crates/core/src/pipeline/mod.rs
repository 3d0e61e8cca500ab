//! Incremental propagation pipeline
//!
//! Four stages run strictly in order for one term:
//! 1. [`ChangeDetector`] finds (course, date) pairs with unpropagated rows
//! 2. [`AggregateInvalidator`] soft-deletes the pairs' aggregates
//! 3. [`BindingRemover`] deletes stale per-user calendar bindings, then
//!    advances the pairs' markers behind a batch barrier
//! 4. [`AggregateRegenerator`] rebuilds aggregates from current source rows

pub mod binding_remover;
pub mod change_detector;
pub mod invalidator;
pub mod ports;
pub mod regenerator;

pub use binding_remover::BindingRemover;
pub use change_detector::ChangeDetector;
pub use invalidator::AggregateInvalidator;
pub use regenerator::{derive_aggregates, AggregateRegenerator};
