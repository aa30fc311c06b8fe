//! Submitter contract and submission errors.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use formstate_types::{FieldName, FormName, FormStatus, ValidationErrors, Value};

/// Boxed future returned by submitters.
pub type SubmitFut = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'static>>;

/// Receives the flat `field name -> value` mapping of a validated form.
pub trait Submitter: Send + Sync {
    fn submit(&self, values: BTreeMap<FieldName, Value>) -> SubmitFut;
}

impl<F, Fut> Submitter for F
where
    F: Fn(BTreeMap<FieldName, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn submit(&self, values: BTreeMap<FieldName, Value>) -> SubmitFut {
        Box::pin(self(values))
    }
}

/// Submitters keyed by the form they submit.
#[derive(Default, Clone)]
pub struct SubmitterRegistry {
    by_form: HashMap<FormName, Arc<dyn Submitter>>,
}

impl fmt::Debug for SubmitterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut forms: Vec<&FormName> = self.by_form.keys().collect();
        forms.sort();
        f.debug_struct("SubmitterRegistry")
            .field("forms", &forms)
            .finish()
    }
}

impl SubmitterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the submitter for `form`, replacing any previous one.
    pub fn insert(&mut self, form: FormName, submitter: impl Submitter + 'static) {
        self.by_form.insert(form, Arc::new(submitter));
    }

    #[must_use]
    pub fn get(&self, form: &FormName) -> Option<Arc<dyn Submitter>> {
        self.by_form.get(form).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_form.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_form.is_empty()
    }
}

/// Why a submission did not complete.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubmitError {
    #[error("form {0} is not registered")]
    UnknownForm(FormName),
    #[error("form {form} cannot be submitted while {status}")]
    NotSubmittable { form: FormName, status: FormStatus },
    #[error("form validation failed for {}", field_list(.0))]
    Validation(ValidationErrors),
    #[error("submission rejected: {0}")]
    Rejected(String),
}

fn field_list(errors: &ValidationErrors) -> String {
    errors
        .keys()
        .map(FieldName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
