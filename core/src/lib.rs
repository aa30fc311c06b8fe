//! Core form-state logic for formstate.
//!
//! This crate holds the synchronous half of the system: the reducer that
//! turns actions into new state snapshots, form status aggregation, and the
//! selectors consumers and the engine read state through.
//!
//! Nothing here performs IO or spawns tasks.

mod aggregate;
mod reducer;
pub mod selectors;

pub use aggregate::{StatusCounts, aggregate_status, next_form_status};
pub use reducer::Reducer;
pub use selectors::{FieldView, FormView, StaleReason, validation_staleness};
