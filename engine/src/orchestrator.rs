//! Async validation and submission on top of the store.
//!
//! Every mutation is a synchronous dispatch. Validators and submitters run
//! afterwards, and their results go back through
//! [`FormStore::dispatch_with`] so the staleness check and the follow-up
//! action are applied atomically. A result computed for a value the field no
//! longer holds, or for a field that was reset or unregistered meanwhile, is
//! dropped.
//!
//! Operations that may start a validation spawn a task and therefore must be
//! called from inside a Tokio runtime.

use std::any::Any;
use std::convert::Infallible;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use formstate_core::selectors::{
    can_submit, field_names, field_view, form_values, form_view, is_field_registered,
};
use formstate_core::{FieldView, FormView, StaleReason, validation_staleness};
use formstate_types::{
    Action, EngineOptions, FieldError, FieldName, FieldStatus, FormName, FormRecord, FormState,
    FormStatus, InitialValueRevalidation, LateRegistration, Meta, Settings, ValidationErrors,
    ValidatorRef, Value,
};

use crate::batch::DispatchBatcher;
use crate::store::{FormStore, StoreEvent, Transition};
use crate::submit::{SubmitError, Submitter, SubmitterRegistry};
use crate::subscriptions::Subscription;
use crate::validators::{Validator, ValidatorRegistry, ValidatorResolver};

// ============================================================================
// Validation handles
// ============================================================================

/// What happened to one validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The result was dispatched; the field now has this status.
    Applied(FieldStatus),
    /// The result arrived for state that no longer exists.
    Discarded(StaleReason),
    /// Nothing to validate: no validator, or the field is not registered.
    NotRequired,
    /// The validation task was aborted before it finished.
    Aborted,
}

#[derive(Debug)]
enum HandleState {
    Ready(ValidationOutcome),
    Running(JoinHandle<ValidationOutcome>),
}

/// Handle to a validation started by a mutation.
///
/// Dropping it does not cancel anything; the validation still runs and its
/// result is still applied if current.
#[derive(Debug)]
pub struct ValidationHandle {
    state: HandleState,
}

impl ValidationHandle {
    fn ready(outcome: ValidationOutcome) -> Self {
        Self {
            state: HandleState::Ready(outcome),
        }
    }

    fn running(task: JoinHandle<ValidationOutcome>) -> Self {
        Self {
            state: HandleState::Running(task),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Ready(_) => true,
            HandleState::Running(task) => task.is_finished(),
        }
    }

    /// Stop a running validation. Its result is never applied, so the field
    /// keeps its current status until the next change.
    pub fn abort(&self) {
        if let HandleState::Running(task) = &self.state {
            task.abort();
        }
    }

    /// Wait for the validation and report what happened to its result.
    pub async fn outcome(self) -> ValidationOutcome {
        match self.state {
            HandleState::Ready(outcome) => outcome,
            HandleState::Running(task) => task.await.unwrap_or_else(|err| {
                if err.is_panic() {
                    tracing::warn!("Validation task panicked: {err}");
                }
                ValidationOutcome::Aborted
            }),
        }
    }
}

// ============================================================================
// Mutation options
// ============================================================================

/// Optional parts of a field registration.
#[derive(Default, Clone)]
pub struct RegisterOptions {
    validate: Option<ValidatorRef>,
    inline: Option<Arc<dyn Validator>>,
    meta: Meta,
}

impl fmt::Debug for RegisterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterOptions")
            .field("validate", &self.validate)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl RegisterOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate through the resolver under `name`.
    pub fn validator(mut self, name: impl Into<String>) -> Self {
        self.validate = Some(ValidatorRef::Named(name.into()));
        self.inline = None;
        self
    }

    /// Validate with a callable owned by this exact form and field.
    pub fn inline_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validate = Some(ValidatorRef::Inline);
        self.inline = Some(Arc::new(validator));
        self
    }

    pub fn meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }
}

/// Optional parts of a value change.
#[derive(Debug, Default, Clone)]
pub struct ChangeOptions {
    /// Programmatic update: does not mark the field touched.
    pub silent: bool,
    pub meta: Meta,
}

impl ChangeOptions {
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }
}

// ============================================================================
// Engine
// ============================================================================

struct EngineInner {
    store: FormStore,
    options: EngineOptions,
    resolver: Arc<dyn ValidatorResolver>,
    inline: Mutex<HashMap<(FormName, FieldName), Arc<dyn Validator>>>,
    submitters: SubmitterRegistry,
}

/// Orchestrates field registration, async validation and submission.
#[derive(Clone)]
pub struct FormEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for FormEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEngine")
            .field("store", &self.inner.store)
            .field("options", &self.inner.options)
            .field("submitters", &self.inner.submitters)
            .finish_non_exhaustive()
    }
}

impl Default for FormEngine {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`FormEngine`].
#[derive(Default)]
pub struct FormEngineBuilder {
    settings: Settings,
    store: Option<FormStore>,
    resolver: Option<Arc<dyn ValidatorResolver>>,
    submitters: SubmitterRegistry,
}

impl FormEngineBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Share an existing store. Its reducer options win over `settings.reducer`.
    pub fn store(mut self, store: FormStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn validators(mut self, resolver: impl ValidatorResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn submitter(mut self, form: FormName, submitter: impl Submitter + 'static) -> Self {
        self.submitters.insert(form, submitter);
        self
    }

    pub fn submitters(mut self, submitters: SubmitterRegistry) -> Self {
        self.submitters = submitters;
        self
    }

    #[must_use]
    pub fn build(self) -> FormEngine {
        let store = self
            .store
            .unwrap_or_else(|| FormStore::new(self.settings.reducer));
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(ValidatorRegistry::new()));
        FormEngine {
            inner: Arc::new(EngineInner {
                store,
                options: self.settings.engine,
                resolver,
                inline: Mutex::new(HashMap::new()),
                submitters: self.submitters,
            }),
        }
    }
}

impl FormEngine {
    #[must_use]
    pub fn builder() -> FormEngineBuilder {
        FormEngineBuilder::default()
    }

    #[must_use]
    pub fn store(&self) -> &FormStore {
        &self.inner.store
    }

    #[must_use]
    pub fn options(&self) -> EngineOptions {
        self.inner.options
    }

    #[must_use]
    pub fn state(&self) -> Arc<FormState> {
        self.inner.store.state()
    }

    /// A batcher in front of this engine's store, using the configured window.
    ///
    /// Fields a flushed batch leaves VALIDATING are validated for their final
    /// value, and late registrations are validated as with
    /// [`FormEngine::register_field`]. Like the mutations, pushing or flushing
    /// must then happen inside a Tokio runtime.
    #[must_use]
    pub fn batcher(&self) -> DispatchBatcher {
        let engine = self.clone();
        DispatchBatcher::new(self.inner.store.clone(), self.inner.options.dispatch)
            .after_flush(move |actions, transition| engine.validate_batch(actions, transition))
    }

    fn validate_batch(&self, actions: &[Action], transition: &Transition) {
        let mut seen = BTreeSet::new();
        for action in actions {
            let (Some(form), Some(field)) = (action.form(), action.field()) else {
                continue;
            };
            if !seen.insert((form, field)) {
                continue;
            }
            let Some(record) = transition.next.field(form, field) else {
                continue;
            };

            if record.status == FieldStatus::Validating {
                tracing::debug!("Validating batched update of {form}/{field}");
                self.start_validation(
                    &transition.next,
                    form,
                    field,
                    record.value.clone(),
                    record.validate.as_ref(),
                );
                continue;
            }

            let newly_registered = transition.prev.field(form, field).is_none();
            let late = transition
                .prev
                .form(form)
                .is_some_and(|record| record.status() != FormStatus::Initial);
            if newly_registered
                && late
                && self.inner.options.late_registration == LateRegistration::Validate
            {
                tracing::debug!("Validating late registration of {form}/{field}");
                self.revalidate(form, field);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Register `field` in `form`, creating the form if needed.
    ///
    /// A field joining a form that is already past INITIAL is validated right
    /// away unless late registrations are configured to be skipped.
    pub fn register_field(
        &self,
        form: &FormName,
        field: &FieldName,
        value: Value,
        options: RegisterOptions,
    ) -> ValidationHandle {
        let RegisterOptions {
            validate,
            inline,
            meta,
        } = options;
        if let Some(validator) = inline {
            self.inline_validators()
                .insert((form.clone(), field.clone()), validator);
        }

        let transition = self.inner.store.transition(Action::RegisterField {
            form: form.clone(),
            field: field.clone(),
            value,
            validate,
            meta,
        });

        let newly_registered = transition.prev.field(form, field).is_none();
        let late = transition
            .prev
            .form(form)
            .is_some_and(|record| record.status() != FormStatus::Initial);
        if !newly_registered
            || !late
            || self.inner.options.late_registration == LateRegistration::Skip
        {
            return ValidationHandle::ready(ValidationOutcome::NotRequired);
        }

        tracing::debug!("Validating late registration of {form}/{field}");
        self.revalidate(form, field)
    }

    /// Remove `field`. The form disappears with its last field.
    pub fn unregister_field(&self, form: &FormName, field: &FieldName) {
        self.inner.store.dispatch(Action::UnregisterField {
            form: form.clone(),
            field: field.clone(),
        });
        self.inline_validators()
            .remove(&(form.clone(), field.clone()));
    }

    /// User-driven value change.
    pub fn change_value(&self, form: &FormName, field: &FieldName, value: Value) -> ValidationHandle {
        self.change_value_with(form, field, value, ChangeOptions::default())
    }

    pub fn change_value_with(
        &self,
        form: &FormName,
        field: &FieldName,
        value: Value,
        options: ChangeOptions,
    ) -> ValidationHandle {
        let state = self.inner.store.dispatch(Action::ChangeValue {
            form: form.clone(),
            field: field.clone(),
            value: value.clone(),
            silent: options.silent,
            meta: options.meta,
        });

        let Some(record) = state.field(form, field) else {
            return ValidationHandle::ready(ValidationOutcome::NotRequired);
        };
        if record.validate.is_none() {
            // Already VALID from the reducer.
            return ValidationHandle::ready(ValidationOutcome::NotRequired);
        }
        self.start_validation(&state, form, field, value, record.validate.as_ref())
    }

    /// Move the pristine baseline of `field`.
    ///
    /// An untouched field that is mid-validation is validated again for the
    /// new value; the in-flight result becomes stale.
    pub fn change_initial_value(
        &self,
        form: &FormName,
        field: &FieldName,
        value: Value,
        meta: Meta,
    ) -> ValidationHandle {
        let transition = self.inner.store.transition(Action::ChangeInitialValue {
            form: form.clone(),
            field: field.clone(),
            value,
            meta,
        });

        let Some(before) = transition.prev.field(form, field) else {
            return ValidationHandle::ready(ValidationOutcome::NotRequired);
        };
        let revalidate = self.inner.options.initial_value_revalidation
            == InitialValueRevalidation::Enabled
            && before.status == FieldStatus::Validating
            && !before.touched;
        if !revalidate {
            return ValidationHandle::ready(ValidationOutcome::NotRequired);
        }

        let Some(record) = transition.next.field(form, field) else {
            return ValidationHandle::ready(ValidationOutcome::Discarded(
                StaleReason::FieldRemoved,
            ));
        };
        self.start_validation(
            &transition.next,
            form,
            field,
            record.value.clone(),
            record.validate.as_ref(),
        )
    }

    pub fn update_meta(&self, form: &FormName, field: &FieldName, meta: Meta) {
        self.inner.store.dispatch(Action::UpdateMeta {
            form: form.clone(),
            field: field.clone(),
            meta,
        });
    }

    pub fn reset_field(&self, form: &FormName, field: &FieldName) {
        self.inner.store.dispatch(Action::ResetField {
            form: form.clone(),
            field: field.clone(),
        });
    }

    pub fn reset_form(&self, form: &FormName) {
        self.inner
            .store
            .dispatch(Action::ResetForm { form: form.clone() });
    }

    /// Drop every form and every inline validator.
    pub fn reset_store(&self) {
        self.inner.store.dispatch(Action::ResetFormStore);
        self.inline_validators().clear();
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Validate and submit `form` with its registered submitter, or a no-op
    /// submitter returning `null` when none is registered.
    pub async fn submit_form(&self, form: &FormName) -> Result<Value, SubmitError> {
        let submitter = self.inner.submitters.get(form);
        self.run_submission(form, submitter).await
    }

    /// Like [`FormEngine::submit_form`], with an explicit submitter.
    pub async fn submit_form_with(
        &self,
        form: &FormName,
        submitter: impl Submitter + 'static,
    ) -> Result<Value, SubmitError> {
        let submitter: Arc<dyn Submitter> = Arc::new(submitter);
        self.run_submission(form, Some(submitter)).await
    }

    async fn run_submission(
        &self,
        form: &FormName,
        submitter: Option<Arc<dyn Submitter>>,
    ) -> Result<Value, SubmitError> {
        let state = self.inner.store.dispatch_with(|state| match state.form(form) {
            None => Err(SubmitError::UnknownForm(form.clone())),
            Some(record) if record.status() == FormStatus::Valid => {
                Ok(Action::SubmitForm { form: form.clone() })
            }
            Some(record) => Err(SubmitError::NotSubmittable {
                form: form.clone(),
                status: record.status(),
            }),
        })?;
        let Some(record) = state.form(form).cloned() else {
            return Err(SubmitError::UnknownForm(form.clone()));
        };

        let failures = self.validate_form(form, &record).await;
        if !failures.is_empty() {
            tracing::debug!(
                "Submission of {form} failed validation for {} field(s)",
                failures.len()
            );
            self.fail_validation(form, &failures);
            let validation_errors = failures
                .into_iter()
                .map(|(name, _, error)| (name, error))
                .collect();
            return Err(SubmitError::Validation(validation_errors));
        }

        let outcome = match submitter {
            Some(submitter) => run_submitter(submitter, record.values(), form).await,
            None => Ok(Value::Null),
        };
        match outcome {
            Ok(result) => {
                self.inner.store.dispatch(Action::SubmitFormSuccess {
                    form: form.clone(),
                    result: result.clone(),
                });
                Ok(result)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!("Submission of {form} rejected: {message}");
                self.inner.store.dispatch(Action::SubmitFormFail {
                    form: form.clone(),
                    error: Some(message.clone()),
                    validation_errors: ValidationErrors::new(),
                });
                Err(SubmitError::Rejected(message))
            }
        }
    }

    /// Record a failed submit-time validation. Errors for values the fields
    /// no longer hold are left out; with none left, the form status is
    /// settled by the configured failure policy.
    fn fail_validation(&self, form: &FormName, failures: &[(FieldName, Value, FieldError)]) {
        let Ok(_) = self.inner.store.dispatch_with(|state| {
            let mut validation_errors = ValidationErrors::new();
            for (name, value, error) in failures {
                match validation_staleness(state, form, name, value) {
                    None => {
                        validation_errors.insert(name.clone(), error.clone());
                    }
                    Some(reason) => {
                        tracing::debug!(
                            "Dropping submit-time error for {form}/{name}: {}",
                            reason.as_str()
                        );
                    }
                }
            }
            Ok::<_, Infallible>(Action::SubmitFormFail {
                form: form.clone(),
                error: None,
                validation_errors,
            })
        });
    }

    /// Run every field's validator against the submitted snapshot, in parallel.
    /// Failures carry the value they were computed for.
    async fn validate_form(
        &self,
        form: &FormName,
        record: &Arc<FormRecord>,
    ) -> Vec<(FieldName, Value, FieldError)> {
        let limit = self.inner.options.validator_timeout;
        let checks: Vec<_> = record
            .fields()
            .filter_map(|(name, field)| {
                let reference = field.validate.as_ref()?;
                let Some(validator) = self.resolve(form, name, reference) else {
                    tracing::warn!("No validator found for {form}/{name}; skipping it on submit");
                    return None;
                };
                let form = form.clone();
                let name = name.clone();
                let value = field.value.clone();
                let snapshot = Arc::clone(record);
                Some(async move {
                    let result =
                        run_validator(validator, value.clone(), snapshot, limit, &form, &name).await;
                    result.err().map(|error| (name, value, error))
                })
            })
            .collect();

        join_all(checks).await.into_iter().flatten().collect()
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Mark `field` VALIDATING and validate its current value.
    fn revalidate(&self, form: &FormName, field: &FieldName) -> ValidationHandle {
        let marked = self.inner.store.dispatch_with(|state| {
            if state.field(form, field).is_some() {
                Ok(Action::Validating {
                    form: form.clone(),
                    field: field.clone(),
                })
            } else {
                Err(StaleReason::FieldRemoved)
            }
        });
        let state = match marked {
            Ok(state) => state,
            Err(reason) => return ValidationHandle::ready(ValidationOutcome::Discarded(reason)),
        };
        let Some(record) = state.field(form, field) else {
            return ValidationHandle::ready(ValidationOutcome::Discarded(
                StaleReason::FieldRemoved,
            ));
        };
        self.start_validation(
            &state,
            form,
            field,
            record.value.clone(),
            record.validate.as_ref(),
        )
    }

    /// Validate `value` for a field that is already VALIDATING in `state`.
    fn start_validation(
        &self,
        state: &FormState,
        form: &FormName,
        field: &FieldName,
        value: Value,
        reference: Option<&ValidatorRef>,
    ) -> ValidationHandle {
        let Some(reference) = reference else {
            return ValidationHandle::ready(self.apply_result(form, field, &value, Ok(())));
        };
        let Some(validator) = self.resolve(form, field, reference) else {
            tracing::warn!("No validator found for {form}/{field}; treating it as valid");
            return ValidationHandle::ready(self.apply_result(form, field, &value, Ok(())));
        };
        let Some(snapshot) = state.form(form).cloned() else {
            return ValidationHandle::ready(ValidationOutcome::Discarded(
                StaleReason::FieldRemoved,
            ));
        };

        let engine = self.clone();
        let form = form.clone();
        let field = field.clone();
        let limit = self.inner.options.validator_timeout;
        ValidationHandle::running(tokio::spawn(async move {
            let result =
                run_validator(validator, value.clone(), snapshot, limit, &form, &field).await;
            engine.apply_result(&form, &field, &value, result)
        }))
    }

    /// Dispatch the result for `value` unless it went stale.
    fn apply_result(
        &self,
        form: &FormName,
        field: &FieldName,
        value: &Value,
        result: Result<(), FieldError>,
    ) -> ValidationOutcome {
        let applied = self.inner.store.dispatch_with(|state| {
            if let Some(reason) = validation_staleness(state, form, field, value) {
                return Err(reason);
            }
            Ok(match result {
                Ok(()) => Action::IsValid {
                    form: form.clone(),
                    field: field.clone(),
                },
                Err(error) => Action::IsInvalid {
                    form: form.clone(),
                    field: field.clone(),
                    error,
                },
            })
        });

        match applied {
            Ok(state) => state.field(form, field).map_or(
                ValidationOutcome::Discarded(StaleReason::FieldRemoved),
                |record| ValidationOutcome::Applied(record.status),
            ),
            Err(reason) => {
                tracing::debug!(
                    "Discarding validation result for {form}/{field}: {}",
                    reason.as_str()
                );
                ValidationOutcome::Discarded(reason)
            }
        }
    }

    fn resolve(
        &self,
        form: &FormName,
        field: &FieldName,
        reference: &ValidatorRef,
    ) -> Option<Arc<dyn Validator>> {
        match reference {
            ValidatorRef::Named(name) => self.inner.resolver.resolve(form, name),
            ValidatorRef::Inline => self
                .inline_validators()
                .get(&(form.clone(), field.clone()))
                .cloned(),
        }
    }

    fn inline_validators(&self) -> MutexGuard<'_, HashMap<(FormName, FieldName), Arc<dyn Validator>>> {
        self.inner
            .inline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Reads and subscriptions
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn field(&self, form: &str, field: &str) -> Option<FieldView> {
        field_view(&self.state(), form, field)
    }

    #[must_use]
    pub fn form(&self, form: &str) -> Option<FormView> {
        form_view(&self.state(), form)
    }

    #[must_use]
    pub fn can_submit(&self, form: &str) -> bool {
        can_submit(&self.state(), form)
    }

    #[must_use]
    pub fn is_field_registered(&self, form: &str, field: &str) -> bool {
        is_field_registered(&self.state(), form, field)
    }

    #[must_use]
    pub fn field_names(&self, form: &str) -> Vec<FieldName> {
        field_names(&self.state(), form)
    }

    #[must_use]
    pub fn form_values(&self, form: &str) -> BTreeMap<FieldName, Value> {
        form_values(&self.state(), form)
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&StoreEvent<'_>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.store.subscribe(listener)
    }

    pub fn subscribe_field(
        &self,
        form: FormName,
        field: FieldName,
        listener: impl Fn(Option<&FieldView>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.store.subscribe_field(form, field, listener)
    }

    pub fn subscribe_form(
        &self,
        form: FormName,
        listener: impl Fn(Option<&FormView>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.store.subscribe_form(form, listener)
    }
}

async fn run_validator(
    validator: Arc<dyn Validator>,
    value: Value,
    snapshot: Arc<FormRecord>,
    limit: Option<Duration>,
    form: &FormName,
    field: &FieldName,
) -> Result<(), FieldError> {
    // The validator is called inside the future so a panic while building
    // it is caught too.
    let call = AssertUnwindSafe(async move { validator.validate(value, snapshot).await })
        .catch_unwind();
    let outcome = match limit {
        Some(limit) => match timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    "Validator for {form}/{field} timed out after {}ms",
                    limit.as_millis()
                );
                return Err(FieldError::message(format!(
                    "validation timed out after {}ms",
                    limit.as_millis()
                )));
            }
        },
        None => call.await,
    };

    outcome.unwrap_or_else(|payload| {
        let message = panic_payload_to_string(payload.as_ref());
        tracing::warn!("Validator for {form}/{field} panicked: {message}");
        Err(FieldError::message(format!("validator panicked: {message}")))
    })
}

async fn run_submitter(
    submitter: Arc<dyn Submitter>,
    values: BTreeMap<FieldName, Value>,
    form: &FormName,
) -> anyhow::Result<Value> {
    AssertUnwindSafe(async move { submitter.submit(values).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            let message = panic_payload_to_string(payload.as_ref());
            tracing::warn!("Submitter for {form} panicked: {message}");
            Err(anyhow!("submitter panicked: {message}"))
        })
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
