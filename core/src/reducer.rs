//! The pure state transition function.
//!
//! `reduce` never mutates: it returns a new `FormState` that shares every
//! untouched record with the previous one, or the very same `Arc` when the
//! action changes nothing (unknown field, absent form, identical result).

use std::sync::Arc;

use formstate_types::{
    Action, ActionKind, FieldError, FieldName, FieldRecord, FieldStatus, FormName, FormRecord,
    FormState, FormStatus, Meta, ReducerOptions, RegisterPolicy, SubmitFailureStatus,
    ValidationErrors, ValidatorRef, Value,
};

use crate::aggregate::{aggregate_status, next_form_status};

/// How the form status follows a field update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormStatusUpdate {
    Keep,
    Recompute,
}

/// Applies actions to state according to a fixed set of [`ReducerOptions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Reducer {
    options: ReducerOptions,
}

impl Reducer {
    #[must_use]
    pub fn new(options: ReducerOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> ReducerOptions {
        self.options
    }

    /// Apply `action` to `state`.
    #[must_use]
    pub fn reduce(&self, state: &Arc<FormState>, action: &Action) -> Arc<FormState> {
        match self.transition(state, action) {
            Some(next) => Arc::new(next),
            None => Arc::clone(state),
        }
    }

    fn transition(&self, state: &FormState, action: &Action) -> Option<FormState> {
        match action {
            Action::RegisterField {
                form,
                field,
                value,
                validate,
                meta,
            } => self.register_field(state, form, field, value, validate.as_ref(), meta),
            Action::UnregisterField { form, field } => unregister_field(state, form, field),
            Action::ChangeValue {
                form,
                field,
                value,
                silent,
                meta,
            } => update_field(
                state,
                action.kind(),
                form,
                field,
                FormStatusUpdate::Recompute,
                |current| FieldRecord {
                    value: value.clone(),
                    // A silent update never flips touched on, and never flips it off.
                    touched: current.touched || !silent,
                    status: if current.has_validator() {
                        FieldStatus::Validating
                    } else {
                        FieldStatus::Valid
                    },
                    error: None,
                    meta: current.meta.merged(meta),
                    ..current.clone()
                },
            ),
            Action::ChangeInitialValue {
                form,
                field,
                value,
                meta,
            } => update_field(
                state,
                action.kind(),
                form,
                field,
                FormStatusUpdate::Keep,
                |current| FieldRecord {
                    initial_value: value.clone(),
                    value: if current.touched {
                        current.value.clone()
                    } else {
                        value.clone()
                    },
                    meta: current.meta.merged(meta),
                    ..current.clone()
                },
            ),
            Action::Validating { form, field } => update_field(
                state,
                action.kind(),
                form,
                field,
                FormStatusUpdate::Recompute,
                |current| FieldRecord {
                    status: FieldStatus::Validating,
                    error: None,
                    ..current.clone()
                },
            ),
            Action::IsValid { form, field } => update_field(
                state,
                action.kind(),
                form,
                field,
                FormStatusUpdate::Recompute,
                |current| FieldRecord {
                    status: FieldStatus::Valid,
                    error: None,
                    ..current.clone()
                },
            ),
            Action::IsInvalid { form, field, error } => update_field(
                state,
                action.kind(),
                form,
                field,
                FormStatusUpdate::Recompute,
                |current| FieldRecord {
                    status: FieldStatus::Invalid,
                    error: Some(error.clone()),
                    ..current.clone()
                },
            ),
            Action::ResetField { form, field } => update_field(
                state,
                action.kind(),
                form,
                field,
                FormStatusUpdate::Recompute,
                FieldRecord::reset,
            ),
            Action::UpdateMeta { form, field, meta } => update_field(
                state,
                action.kind(),
                form,
                field,
                FormStatusUpdate::Keep,
                |current| FieldRecord {
                    meta: current.meta.merged(meta),
                    ..current.clone()
                },
            ),
            // A successful submission makes the form pristine again.
            Action::ResetForm { form } | Action::SubmitFormSuccess { form, .. } => {
                reset_form(state, action.kind(), form)
            }
            Action::SubmitForm { form } => {
                let record = existing_form(state, action.kind(), form)?;
                let next = record
                    .with_status(FormStatus::Submitting)
                    .with_error(None);
                Some(state.with_form(form.clone(), next))
            }
            Action::SubmitFormFail {
                form,
                error,
                validation_errors,
            } => self.submit_form_fail(state, form, error.as_ref(), validation_errors),
            Action::ResetFormStore => (!state.is_empty()).then(FormState::new),
        }
    }

    fn register_field(
        &self,
        state: &FormState,
        form: &FormName,
        field: &FieldName,
        value: &Value,
        validate: Option<&ValidatorRef>,
        meta: &Meta,
    ) -> Option<FormState> {
        let created;
        let record = match state.form(form) {
            Some(record) => &**record,
            None => {
                created = FormRecord::new(FormStatus::Initial);
                &created
            }
        };

        let next_field = match record.field(field) {
            None => FieldRecord::registered(value.clone(), validate.cloned(), Meta::new().merged(meta)),
            Some(existing) => {
                let mut next = FieldRecord {
                    validate: validate.cloned().or_else(|| existing.validate.clone()),
                    meta: existing.meta.merged(meta),
                    ..existing.as_ref().clone()
                };
                if self.options.register == RegisterPolicy::RefreshInitialValue {
                    next.initial_value = value.clone();
                    if !next.touched {
                        next.value = value.clone();
                    }
                }
                if next == **existing {
                    return None;
                }
                next
            }
        };

        Some(state.with_form(form.clone(), record.with_field(field.clone(), next_field)))
    }

    fn submit_form_fail(
        &self,
        state: &FormState,
        form: &FormName,
        error: Option<&String>,
        validation_errors: &ValidationErrors,
    ) -> Option<FormState> {
        let record = existing_form(state, ActionKind::SubmitFormFail, form)?;

        let mut known = false;
        for name in validation_errors.keys() {
            if record.field(name).is_some() {
                known = true;
            } else {
                tracing::debug!("Dropping submit validation error for unregistered field {form}/{name}");
            }
        }

        // Errors naming only unregistered fields mark nothing invalid.
        let next = if known {
            record
                .map_fields(|name, field| {
                    validation_errors.get(name).map(|err| invalid(field, err))
                })
                .with_status(FormStatus::Invalid)
        } else {
            let status = match self.options.submit_failure {
                SubmitFailureStatus::Recompute => {
                    aggregate_status(record.field_statuses(), FormStatus::Initial)
                }
                SubmitFailureStatus::Invalid => FormStatus::Invalid,
            };
            record.with_status(status)
        };

        Some(state.with_form(form.clone(), next.with_error(error.cloned())))
    }
}

fn invalid(field: &FieldRecord, error: &FieldError) -> FieldRecord {
    FieldRecord {
        status: FieldStatus::Invalid,
        error: Some(error.clone()),
        ..field.clone()
    }
}

fn existing_form<'a>(
    state: &'a FormState,
    kind: ActionKind,
    form: &FormName,
) -> Option<&'a Arc<FormRecord>> {
    let record = state.form(form);
    if record.is_none() {
        tracing::debug!("Ignoring {} for unknown form {form}", kind.as_str());
    }
    record
}

fn update_field(
    state: &FormState,
    kind: ActionKind,
    form: &FormName,
    field: &FieldName,
    status: FormStatusUpdate,
    f: impl FnOnce(&FieldRecord) -> FieldRecord,
) -> Option<FormState> {
    let Some(current) = state.field(form, field) else {
        tracing::debug!("Ignoring {} for unregistered field {form}/{field}", kind.as_str());
        return None;
    };
    let next_field = f(current);
    if next_field == **current {
        return None;
    }

    let record = state.form(form)?.with_field(field.clone(), next_field);
    let record = match status {
        FormStatusUpdate::Keep => record,
        FormStatusUpdate::Recompute => {
            let next_status = next_form_status(&record, FormStatus::Initial);
            record.with_status(next_status)
        }
    };
    Some(state.with_form(form.clone(), record))
}

fn unregister_field(state: &FormState, form: &FormName, field: &FieldName) -> Option<FormState> {
    let record = state.form(form)?;
    if record.field(field).is_none() {
        tracing::debug!("Ignoring UNREGISTER_FIELD for unregistered field {form}/{field}");
        return None;
    }

    let remaining = record.without_field(field);
    if remaining.is_empty() {
        return Some(state.without_form(form));
    }
    let next_status = next_form_status(&remaining, FormStatus::Initial);
    Some(state.with_form(form.clone(), remaining.with_status(next_status)))
}

fn reset_form(state: &FormState, kind: ActionKind, form: &FormName) -> Option<FormState> {
    let record = existing_form(state, kind, form)?;
    let next = record
        .map_fields(|_, field| {
            let reset = field.reset();
            (reset != *field).then_some(reset)
        })
        .with_status(FormStatus::Initial)
        .with_error(None);
    if next == **record {
        return None;
    }
    Some(state.with_form(form.clone(), next))
}
