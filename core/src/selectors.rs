//! Read-only derivations over a state snapshot.
//!
//! Views are plain values compared with `==` by subscribers, so they carry
//! only what a consumer renders.

use std::collections::BTreeMap;

use serde::Serialize;

use formstate_types::{FieldName, FieldStatus, FormState, FormStatus, Meta, Value};

/// Consumer-facing projection of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub value: Value,
    pub initial_value: Value,
    pub meta: Meta,
    pub status: FieldStatus,
    /// Normalized validation messages; empty unless the field is INVALID.
    pub messages: Vec<String>,
    /// A validation is in flight.
    pub loading: bool,
    /// The owning form is submitting.
    pub submitting: bool,
    pub touched: bool,
}

/// Consumer-facing projection of one form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormView {
    pub status: FormStatus,
    pub can_submit: bool,
    pub submitting: bool,
    pub submit_error: Option<String>,
    pub field_names: Vec<FieldName>,
}

#[must_use]
pub fn field_view(state: &FormState, form: &str, field: &str) -> Option<FieldView> {
    let record = state.form(form)?;
    let field = record.field(field)?;
    Some(FieldView {
        value: field.value.clone(),
        initial_value: field.initial_value.clone(),
        meta: field.meta.clone(),
        status: field.status,
        messages: field
            .error
            .as_ref()
            .map(|err| err.messages())
            .unwrap_or_default(),
        loading: field.status == FieldStatus::Validating,
        submitting: record.status() == FormStatus::Submitting,
        touched: field.touched,
    })
}

#[must_use]
pub fn form_view(state: &FormState, form: &str) -> Option<FormView> {
    let record = state.form(form)?;
    Some(FormView {
        status: record.status(),
        can_submit: record.status() == FormStatus::Valid,
        submitting: record.status() == FormStatus::Submitting,
        submit_error: record.error().map(str::to_string),
        field_names: record.field_names().cloned().collect(),
    })
}

/// True iff the form exists and is VALID. An absent form cannot be submitted.
#[must_use]
pub fn can_submit(state: &FormState, form: &str) -> bool {
    state
        .form(form)
        .is_some_and(|record| record.status() == FormStatus::Valid)
}

#[must_use]
pub fn is_submitting(state: &FormState, form: &str) -> bool {
    state
        .form(form)
        .is_some_and(|record| record.status() == FormStatus::Submitting)
}

#[must_use]
pub fn submit_error<'a>(state: &'a FormState, form: &str) -> Option<&'a str> {
    state.form(form).and_then(|record| record.error())
}

#[must_use]
pub fn is_field_registered(state: &FormState, form: &str, field: &str) -> bool {
    state.field(form, field).is_some()
}

/// Field names of `form` in key order; empty for an absent form.
#[must_use]
pub fn field_names(state: &FormState, form: &str) -> Vec<FieldName> {
    state
        .form(form)
        .map(|record| record.field_names().cloned().collect())
        .unwrap_or_default()
}

#[must_use]
pub fn field_value<'a>(state: &'a FormState, form: &str, field: &str) -> Option<&'a Value> {
    state.field(form, field).map(|field| &field.value)
}

/// The `field name -> value` mapping a submitter receives.
#[must_use]
pub fn form_values(state: &FormState, form: &str) -> BTreeMap<FieldName, Value> {
    state
        .form(form)
        .map(|record| record.values())
        .unwrap_or_default()
}

/// Why a finished validation must not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The field holds a different value than the one validated.
    ValueChanged,
    /// The field was reset (or its form reset) after validation started.
    FieldReset,
    /// The field, or its whole form, was unregistered.
    FieldRemoved,
}

impl StaleReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValueChanged => "value changed",
            Self::FieldReset => "field reset",
            Self::FieldRemoved => "field removed",
        }
    }
}

/// Decide whether a validation result for `validated` may still be applied.
///
/// `None` means the result is current: the field exists, still holds the
/// validated value, and has not been reset since.
#[must_use]
pub fn validation_staleness(
    state: &FormState,
    form: &str,
    field: &str,
    validated: &Value,
) -> Option<StaleReason> {
    let Some(current) = state.field(form, field) else {
        return Some(StaleReason::FieldRemoved);
    };
    if current.value != *validated {
        return Some(StaleReason::ValueChanged);
    }
    if current.status == FieldStatus::Initial {
        return Some(StaleReason::FieldReset);
    }
    None
}
