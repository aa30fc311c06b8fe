//! Form-state engine for formstate - store, subscriptions and orchestration.
//!
//! [`FormStore`] owns the current snapshot and applies actions through the
//! reducer from `formstate-core`. [`FormEngine`] sits on top of it and runs
//! caller-supplied validators and submitters, feeding their results back as
//! actions only while they are still current.

mod batch;
mod orchestrator;
mod store;
mod submit;
mod subscriptions;
mod validators;

pub use batch::DispatchBatcher;
pub use orchestrator::{
    ChangeOptions, FormEngine, FormEngineBuilder, RegisterOptions, ValidationHandle,
    ValidationOutcome,
};
pub use store::{FormStore, StoreEvent};
pub use submit::{SubmitError, SubmitFut, Submitter, SubmitterRegistry};
pub use subscriptions::Subscription;
pub use validators::{RegistryError, Validator, ValidatorFut, ValidatorRegistry, ValidatorResolver};

pub use formstate_core::{FieldView, FormView, StaleReason};
pub use formstate_types::{
    Action, FieldError, FieldName, FieldStatus, FormName, FormState, FormStatus, Meta, Settings,
    ValidationErrors, ValidatorRef, Value,
};

#[cfg(test)]
mod tests;
