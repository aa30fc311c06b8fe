//! The closed action vocabulary.
//!
//! Actions are plain data: they carry no callables, only names, values and
//! validator references, so they can be logged, serialized and replayed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FieldError, FieldName, FormName, Meta, ValidationErrors, ValidatorRef};

/// An intent to change the form store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    RegisterField {
        form: FormName,
        field: FieldName,
        value: Value,
        #[serde(default)]
        validate: Option<ValidatorRef>,
        #[serde(default)]
        meta: Meta,
    },
    UnregisterField {
        form: FormName,
        field: FieldName,
    },
    ChangeValue {
        form: FormName,
        field: FieldName,
        value: Value,
        /// Programmatic update that must not count as user interaction.
        #[serde(default)]
        silent: bool,
        #[serde(default)]
        meta: Meta,
    },
    ChangeInitialValue {
        form: FormName,
        field: FieldName,
        value: Value,
        #[serde(default)]
        meta: Meta,
    },
    Validating {
        form: FormName,
        field: FieldName,
    },
    IsValid {
        form: FormName,
        field: FieldName,
    },
    IsInvalid {
        form: FormName,
        field: FieldName,
        error: FieldError,
    },
    ResetField {
        form: FormName,
        field: FieldName,
    },
    ResetForm {
        form: FormName,
    },
    SubmitForm {
        form: FormName,
    },
    SubmitFormSuccess {
        form: FormName,
        #[serde(default)]
        result: Value,
    },
    SubmitFormFail {
        form: FormName,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        validation_errors: ValidationErrors,
    },
    UpdateMeta {
        form: FormName,
        field: FieldName,
        meta: Meta,
    },
    ResetFormStore,
}

/// Discriminant of [`Action`], for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    RegisterField,
    UnregisterField,
    ChangeValue,
    ChangeInitialValue,
    Validating,
    IsValid,
    IsInvalid,
    ResetField,
    ResetForm,
    SubmitForm,
    SubmitFormSuccess,
    SubmitFormFail,
    UpdateMeta,
    ResetFormStore,
}

impl ActionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegisterField => "REGISTER_FIELD",
            Self::UnregisterField => "UNREGISTER_FIELD",
            Self::ChangeValue => "CHANGE_VALUE",
            Self::ChangeInitialValue => "CHANGE_INITIAL_VALUE",
            Self::Validating => "VALIDATING",
            Self::IsValid => "IS_VALID",
            Self::IsInvalid => "IS_INVALID",
            Self::ResetField => "RESET_FIELD",
            Self::ResetForm => "RESET_FORM",
            Self::SubmitForm => "SUBMIT_FORM",
            Self::SubmitFormSuccess => "SUBMIT_FORM_SUCCESS",
            Self::SubmitFormFail => "SUBMIT_FORM_FAIL",
            Self::UpdateMeta => "UPDATE_META",
            Self::ResetFormStore => "RESET_FORM_STORE",
        }
    }

    /// Terminal outcome of a field validation.
    #[must_use]
    pub const fn is_validation_result(self) -> bool {
        matches!(self, Self::IsValid | Self::IsInvalid)
    }
}

impl Action {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::RegisterField { .. } => ActionKind::RegisterField,
            Self::UnregisterField { .. } => ActionKind::UnregisterField,
            Self::ChangeValue { .. } => ActionKind::ChangeValue,
            Self::ChangeInitialValue { .. } => ActionKind::ChangeInitialValue,
            Self::Validating { .. } => ActionKind::Validating,
            Self::IsValid { .. } => ActionKind::IsValid,
            Self::IsInvalid { .. } => ActionKind::IsInvalid,
            Self::ResetField { .. } => ActionKind::ResetField,
            Self::ResetForm { .. } => ActionKind::ResetForm,
            Self::SubmitForm { .. } => ActionKind::SubmitForm,
            Self::SubmitFormSuccess { .. } => ActionKind::SubmitFormSuccess,
            Self::SubmitFormFail { .. } => ActionKind::SubmitFormFail,
            Self::UpdateMeta { .. } => ActionKind::UpdateMeta,
            Self::ResetFormStore => ActionKind::ResetFormStore,
        }
    }

    /// Target form, `None` only for the global store reset.
    #[must_use]
    pub fn form(&self) -> Option<&FormName> {
        match self {
            Self::RegisterField { form, .. }
            | Self::UnregisterField { form, .. }
            | Self::ChangeValue { form, .. }
            | Self::ChangeInitialValue { form, .. }
            | Self::Validating { form, .. }
            | Self::IsValid { form, .. }
            | Self::IsInvalid { form, .. }
            | Self::ResetField { form, .. }
            | Self::ResetForm { form }
            | Self::SubmitForm { form }
            | Self::SubmitFormSuccess { form, .. }
            | Self::SubmitFormFail { form, .. }
            | Self::UpdateMeta { form, .. } => Some(form),
            Self::ResetFormStore => None,
        }
    }

    /// Target field for field-scoped actions.
    #[must_use]
    pub fn field(&self) -> Option<&FieldName> {
        match self {
            Self::RegisterField { field, .. }
            | Self::UnregisterField { field, .. }
            | Self::ChangeValue { field, .. }
            | Self::ChangeInitialValue { field, .. }
            | Self::Validating { field, .. }
            | Self::IsValid { field, .. }
            | Self::IsInvalid { field, .. }
            | Self::ResetField { field, .. }
            | Self::UpdateMeta { field, .. } => Some(field),
            Self::ResetForm { .. }
            | Self::SubmitForm { .. }
            | Self::SubmitFormSuccess { .. }
            | Self::SubmitFormFail { .. }
            | Self::ResetFormStore => None,
        }
    }
}
