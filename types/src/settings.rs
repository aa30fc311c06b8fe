//! Resolved configuration types shared across crates.
//!
//! Raw TOML deserialization structs stay private in `formstate-config`. The
//! config loader resolves them into these types at the parse boundary, so a
//! value here is always a valid choice: no stringly-typed modes, no bare flags.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What REGISTER_FIELD does to a field that is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterPolicy {
    /// Keep value, initial value, touched, status and error as they are.
    #[default]
    PreserveExisting,
    /// Take the registration value as the new initial value (and as the
    /// current value while the field is untouched).
    RefreshInitialValue,
}

/// Form status after a submission fails without any field validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitFailureStatus {
    /// Aggregate the fields again. Fields were valid, so the form usually
    /// becomes submittable again.
    #[default]
    Recompute,
    /// Force the form INVALID until a field changes.
    Invalid,
}

/// Knobs for the pure reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReducerOptions {
    pub register: RegisterPolicy,
    pub submit_failure: SubmitFailureStatus,
}

/// Whether a field registering into an already-active form is validated immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LateRegistration {
    #[default]
    Validate,
    Skip,
}

/// Whether changing the initial value of an untouched, validating field
/// starts a validation for the new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialValueRevalidation {
    #[default]
    Enabled,
    Disabled,
}

/// How buffered dispatches reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Every push is applied right away.
    #[default]
    Immediate,
    /// Pushes are buffered and applied together once the window elapses.
    Batched(Duration),
}

/// Knobs for the async orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineOptions {
    pub late_registration: LateRegistration,
    pub initial_value_revalidation: InitialValueRevalidation,
    /// Validators running longer than this count as failed.
    pub validator_timeout: Option<Duration>,
    pub dispatch: DispatchMode,
}

/// Everything a store/engine pair needs from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Settings {
    pub reducer: ReducerOptions,
    pub engine: EngineOptions,
}
