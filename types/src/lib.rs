//! Core domain types for formstate.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies:
//! names, statuses, field/form records, the store state and the action vocabulary.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod action;
mod error;
mod ids;
mod meta;
mod record;
pub mod settings;

pub use action::{Action, ActionKind};
pub use error::{FieldError, ValidationErrors};
pub use ids::{EmptyNameError, FieldName, FormName};
pub use meta::Meta;
pub use record::{FieldRecord, FormRecord, FormState, ValidatorRef};
pub use serde_json::Value;
pub use settings::{
    DispatchMode, EngineOptions, InitialValueRevalidation, LateRegistration, ReducerOptions,
    RegisterPolicy, Settings, SubmitFailureStatus,
};

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Statuses
// ============================================================================

/// Validation status of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldStatus {
    /// Registered, never validated (or reset).
    #[default]
    Initial,
    Validating,
    Valid,
    Invalid,
}

impl FieldStatus {
    pub const ALL: [FieldStatus; 4] = [
        FieldStatus::Initial,
        FieldStatus::Validating,
        FieldStatus::Valid,
        FieldStatus::Invalid,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Validating => "VALIDATING",
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of a form.
///
/// Derived from the field statuses, except `Submitting`, which only explicit
/// submit/reset actions enter and leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormStatus {
    #[default]
    Initial,
    Validating,
    Valid,
    Invalid,
    Submitting,
}

impl FormStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Validating => "VALIDATING",
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Submitting => "SUBMITTING",
        }
    }
}

impl From<FieldStatus> for FormStatus {
    fn from(status: FieldStatus) -> Self {
        match status {
            FieldStatus::Initial => Self::Initial,
            FieldStatus::Validating => Self::Validating,
            FieldStatus::Valid => Self::Valid,
            FieldStatus::Invalid => Self::Invalid,
        }
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
