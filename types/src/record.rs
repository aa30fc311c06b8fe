//! Store records.
//!
//! ```text
//! FormState
//! └── FormName -> Arc<FormRecord>  (status, submission error)
//!     └── FieldName -> Arc<FieldRecord>
//! ```
//!
//! Every level sits behind an `Arc`. Transitions build new records along the
//! touched path and share everything else, so `Arc::ptr_eq` on any level is a
//! valid "unchanged" check.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FieldError, FieldName, FieldStatus, FormName, FormStatus, Meta};

/// Reference to the validator of a field.
///
/// The store only keeps the reference; turning it into something callable is
/// the orchestrator's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorRef {
    /// Looked up by name in an injected validator registry.
    Named(String),
    /// A callable registered with the engine for exactly this form and field.
    Inline,
}

impl ValidatorRef {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

/// Tracked state of one registered field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub value: Value,
    /// Baseline the field resets to. `value` follows it while `touched` is false.
    pub initial_value: Value,
    pub touched: bool,
    pub status: FieldStatus,
    /// Present only while `status` is `Invalid`.
    pub error: Option<FieldError>,
    pub validate: Option<ValidatorRef>,
    pub meta: Meta,
}

impl FieldRecord {
    /// A freshly registered, pristine field.
    #[must_use]
    pub fn registered(value: Value, validate: Option<ValidatorRef>, meta: Meta) -> Self {
        Self {
            initial_value: value.clone(),
            value,
            touched: false,
            status: FieldStatus::Initial,
            error: None,
            validate,
            meta,
        }
    }

    /// The same field as it was right after registration.
    #[must_use]
    pub fn reset(&self) -> Self {
        Self {
            value: self.initial_value.clone(),
            touched: false,
            status: FieldStatus::Initial,
            error: None,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn has_validator(&self) -> bool {
        self.validate.is_some()
    }
}

/// A named collection of fields plus the form-level status and submission error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormRecord {
    status: FormStatus,
    /// Submission error, distinct from per-field validation errors.
    error: Option<String>,
    fields: BTreeMap<FieldName, Arc<FieldRecord>>,
}

impl FormRecord {
    #[must_use]
    pub fn new(status: FormStatus) -> Self {
        Self {
            status,
            error: None,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> FormStatus {
        self.status
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Arc<FieldRecord>> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> btree_map::Iter<'_, FieldName, Arc<FieldRecord>> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> btree_map::Keys<'_, FieldName, Arc<FieldRecord>> {
        self.fields.keys()
    }

    pub fn field_statuses(&self) -> impl Iterator<Item = FieldStatus> + '_ {
        self.fields.values().map(|field| field.status)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flat `field name -> value` mapping, the shape handed to submitters.
    #[must_use]
    pub fn values(&self) -> BTreeMap<FieldName, Value> {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.value.clone()))
            .collect()
    }

    #[must_use]
    pub fn with_status(&self, status: FormStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_error(&self, error: Option<String>) -> Self {
        Self {
            error,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_field(&self, name: FieldName, field: FieldRecord) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(name, Arc::new(field));
        Self {
            fields,
            ..self.clone_header()
        }
    }

    #[must_use]
    pub fn without_field(&self, name: &str) -> Self {
        let mut fields = self.fields.clone();
        fields.remove(name);
        Self {
            fields,
            ..self.clone_header()
        }
    }

    /// Rebuild every field through `f`. Fields for which `f` returns `None`
    /// keep their existing `Arc`.
    #[must_use]
    pub fn map_fields(&self, mut f: impl FnMut(&FieldName, &FieldRecord) -> Option<FieldRecord>) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|(name, field)| {
                let next = f(name, field).map_or_else(|| Arc::clone(field), Arc::new);
                (name.clone(), next)
            })
            .collect();
        Self {
            fields,
            ..self.clone_header()
        }
    }

    fn clone_header(&self) -> Self {
        Self {
            status: self.status,
            error: self.error.clone(),
            fields: BTreeMap::new(),
        }
    }
}

/// The whole store: every registered form keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormState {
    forms: BTreeMap<FormName, Arc<FormRecord>>,
}

impl FormState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn form(&self, name: &str) -> Option<&Arc<FormRecord>> {
        self.forms.get(name)
    }

    #[must_use]
    pub fn field(&self, form: &str, field: &str) -> Option<&Arc<FieldRecord>> {
        self.form(form).and_then(|form| form.field(field))
    }

    pub fn forms(&self) -> btree_map::Iter<'_, FormName, Arc<FormRecord>> {
        self.forms.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    #[must_use]
    pub fn with_form(&self, name: FormName, form: FormRecord) -> Self {
        let mut forms = self.forms.clone();
        forms.insert(name, Arc::new(form));
        Self { forms }
    }

    #[must_use]
    pub fn without_form(&self, name: &str) -> Self {
        let mut forms = self.forms.clone();
        forms.remove(name);
        Self { forms }
    }
}
