//! Validator contract and name resolution.
//!
//! The store only records a [`ValidatorRef`](formstate_types::ValidatorRef).
//! Named references are resolved through a [`ValidatorResolver`] injected
//! when the engine is built; inline validators live in the engine itself.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use formstate_types::{FieldError, FormName, FormRecord, Value};

/// Boxed future returned by validators.
pub type ValidatorFut = Pin<Box<dyn Future<Output = Result<(), FieldError>> + Send + 'static>>;

/// Checks one field value.
///
/// `form` is the form as it was when validation started. `Err` is the only
/// failure channel: a validator that rejects and one that resolves to an error
/// value both return `Err`.
pub trait Validator: Send + Sync {
    fn validate(&self, value: Value, form: Arc<FormRecord>) -> ValidatorFut;
}

impl<F, Fut> Validator for F
where
    F: Fn(Value, Arc<FormRecord>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), FieldError>> + Send + 'static,
{
    fn validate(&self, value: Value, form: Arc<FormRecord>) -> ValidatorFut {
        Box::pin(self(value, form))
    }
}

/// Turns a validator name into something callable.
pub trait ValidatorResolver: Send + Sync {
    fn resolve(&self, form: &FormName, name: &str) -> Option<Arc<dyn Validator>>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("validator {name} is already registered")]
    DuplicateValidator { name: String },
    #[error("validator {name} is already registered for form {form}")]
    DuplicateScopedValidator { form: FormName, name: String },
}

/// Name-keyed validators, global or scoped to one form.
///
/// Resolution looks in the form's own scope first, then globally.
#[derive(Default)]
pub struct ValidatorRegistry {
    global: HashMap<String, Arc<dyn Validator>>,
    scoped: HashMap<FormName, HashMap<String, Arc<dyn Validator>>>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut global: Vec<&String> = self.global.keys().collect();
        global.sort();
        f.debug_struct("ValidatorRegistry")
            .field("global", &global)
            .field("scoped_forms", &self.scoped.len())
            .finish()
    }
}

impl ValidatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        validator: impl Validator + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.global.contains_key(&name) {
            return Err(RegistryError::DuplicateValidator { name });
        }
        self.global.insert(name, Arc::new(validator));
        Ok(())
    }

    pub fn register_for_form(
        &mut self,
        form: FormName,
        name: impl Into<String>,
        validator: impl Validator + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let scope = self.scoped.entry(form.clone()).or_default();
        if scope.contains_key(&name) {
            return Err(RegistryError::DuplicateScopedValidator { form, name });
        }
        scope.insert(name, Arc::new(validator));
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.global.len() + self.scoped.values().map(HashMap::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ValidatorResolver for ValidatorRegistry {
    fn resolve(&self, form: &FormName, name: &str) -> Option<Arc<dyn Validator>> {
        self.scoped
            .get(form)
            .and_then(|scope| scope.get(name))
            .or_else(|| self.global.get(name))
            .cloned()
    }
}

impl<F> ValidatorResolver for F
where
    F: Fn(&FormName, &str) -> Option<Arc<dyn Validator>> + Send + Sync,
{
    fn resolve(&self, form: &FormName, name: &str) -> Option<Arc<dyn Validator>> {
        self(form, name)
    }
}
