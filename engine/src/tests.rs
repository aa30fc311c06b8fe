//! Unit tests for the engine crate.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::task::yield_now;
use tokio::time::sleep;

use formstate_types::{
    ActionKind, DispatchMode, EngineOptions, FormRecord, LateRegistration, ReducerOptions,
    SubmitFailureStatus,
};

use super::*;

fn form(name: &str) -> FormName {
    FormName::new(name).expect("valid form name")
}

fn field(name: &str) -> FieldName {
    FieldName::new(name).expect("valid field name")
}

fn register(name: &str, value: Value) -> Action {
    Action::RegisterField {
        form: form("profile"),
        field: field(name),
        value,
        validate: None,
        meta: Meta::new(),
    }
}

fn change(name: &str, value: Value) -> Action {
    Action::ChangeValue {
        form: form("profile"),
        field: field(name),
        value,
        silent: false,
        meta: Meta::new(),
    }
}

fn reject_all(message: &'static str) -> impl Validator + 'static {
    move |_value: Value, _form: Arc<FormRecord>| async move { Err::<(), _>(FieldError::message(message)) }
}

fn accept_all() -> impl Validator + 'static {
    |_value: Value, _form: Arc<FormRecord>| async { Ok::<(), FieldError>(()) }
}

/// A validation waiting for the test to decide its result.
struct PendingCall {
    value: Value,
    reply: oneshot::Sender<Result<(), FieldError>>,
}

impl PendingCall {
    fn resolve(self, result: Result<(), FieldError>) {
        let _ = self.reply.send(result);
    }
}

/// Validator whose calls are handed to the test through a channel.
fn gated() -> (impl Validator + 'static, mpsc::UnboundedReceiver<PendingCall>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let validator = move |value: Value, _form: Arc<FormRecord>| {
        let tx = tx.clone();
        async move {
            let (reply, wait) = oneshot::channel();
            if tx.send(PendingCall { value, reply }).is_err() {
                return Ok(());
            }
            wait.await.unwrap_or(Ok(()))
        }
    };
    (validator, rx)
}

fn result_dispatches(store: &FormStore) -> (Arc<AtomicUsize>, Subscription) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let subscription = store.subscribe(move |event| {
        let results = event
            .actions
            .iter()
            .filter(|action| action.kind().is_validation_result())
            .count();
        seen.fetch_add(results, Ordering::SeqCst);
    });
    (count, subscription)
}

fn status_of(engine: &FormEngine, form: &str, name: &str) -> FieldStatus {
    engine.field(form, name).expect("field registered").status
}

// ============================================================================
// Store
// ============================================================================

#[test]
fn dispatch_returns_and_publishes_snapshot() {
    let store = FormStore::default();
    let next = store.dispatch(register("age", json!(30)));

    assert!(Arc::ptr_eq(&next, &store.state()));
    assert_eq!(
        store.state().field("profile", "age").unwrap().value,
        json!(30)
    );
}

#[test]
fn snapshots_survive_later_dispatches() {
    let store = FormStore::default();
    store.dispatch(register("age", json!(30)));
    let before = store.state();
    store.dispatch(change("age", json!(31)));

    assert_eq!(before.field("profile", "age").unwrap().value, json!(30));
    assert_eq!(store.state().field("profile", "age").unwrap().value, json!(31));
}

#[test]
fn dispatch_with_error_dispatches_nothing() {
    let store = FormStore::default();
    let events = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&events);
    let _sub = store.subscribe(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let result = store.dispatch_with(|state| {
        if state.is_empty() {
            Err("empty")
        } else {
            Ok(Action::ResetFormStore)
        }
    });
    assert_eq!(result.unwrap_err(), "empty");
    assert_eq!(events.load(Ordering::SeqCst), 0);
}

#[test]
fn batch_is_one_notification() {
    let store = FormStore::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = store.subscribe(move |event| {
        sink.lock().unwrap().push(event.actions.len());
    });

    store.dispatch_batch(vec![
        register("age", json!(30)),
        register("name", json!("Ada")),
        change("age", json!(31)),
    ]);
    store.dispatch_batch(Vec::new());

    assert_eq!(*seen.lock().unwrap(), vec![3]);
    assert_eq!(store.state().form("profile").unwrap().len(), 2);
}

#[test]
fn store_listeners_see_no_op_dispatches_as_unchanged() {
    let store = FormStore::default();
    let changed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changed);
    let _sub = store.subscribe(move |event| {
        sink.lock().unwrap().push(event.changed());
    });

    store.dispatch(register("age", json!(30)));
    store.dispatch(change("missing", json!(1)));

    assert_eq!(*changed.lock().unwrap(), vec![true, false]);
}

#[test]
fn field_listener_fires_only_on_view_change() {
    let store = FormStore::default();
    store.dispatch(register("age", json!(30)));
    store.dispatch(register("name", json!("Ada")));

    let views = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&views);
    let _sub = store.subscribe_field(form("profile"), field("age"), move |view| {
        sink.lock().unwrap().push(view.map(|view| view.value.clone()));
    });

    store.dispatch(change("name", json!("Grace")));
    assert!(views.lock().unwrap().is_empty());

    store.dispatch(change("age", json!(31)));
    store.dispatch(Action::UpdateMeta {
        form: form("profile"),
        field: field("age"),
        meta: Meta::new(),
    });
    store.dispatch(Action::UnregisterField {
        form: form("profile"),
        field: field("age"),
    });

    assert_eq!(*views.lock().unwrap(), vec![Some(json!(31)), None]);
}

#[test]
fn form_listener_tracks_submittability() {
    let store = FormStore::default();
    store.dispatch(register("age", json!(30)));

    let flags = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&flags);
    let _sub = store.subscribe_form(form("profile"), move |view| {
        sink.lock().unwrap().push(view.map(|view| view.can_submit));
    });

    store.dispatch(change("age", json!(31)));
    store.dispatch(Action::SubmitForm {
        form: form("profile"),
    });
    store.dispatch(Action::ResetFormStore);

    assert_eq!(*flags.lock().unwrap(), vec![Some(true), Some(false), None]);
}

#[test]
fn dropping_subscription_unsubscribes() {
    let store = FormStore::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let sub = store.subscribe(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(store.listener_count(), 1);

    store.dispatch(register("age", json!(30)));
    sub.unsubscribe();
    store.dispatch(change("age", json!(31)));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.listener_count(), 0);

    {
        let _scoped = store.subscribe(|_| {});
        assert_eq!(store.listener_count(), 1);
    }
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn listeners_may_dispatch() {
    let store = FormStore::default();
    let handle = store.clone();
    let _sub = store.subscribe(move |event| {
        let registered = event
            .actions
            .iter()
            .any(|action| action.kind() == ActionKind::RegisterField);
        if registered {
            handle.dispatch(Action::UpdateMeta {
                form: form("profile"),
                field: field("age"),
                meta: Meta::new().with("seen", true),
            });
        }
    });

    store.dispatch(register("age", json!(30)));
    let age = store.state().field("profile", "age").cloned().unwrap();
    assert_eq!(age.meta.get("seen"), Some(&json!(true)));
}

#[test]
fn watches_end_on_latest_view_after_nested_dispatch() {
    let store = FormStore::default();
    store.dispatch(register("age", json!(0)));

    let handle = store.clone();
    let _follow_up = store.subscribe(move |event| {
        if event.actions.contains(&change("age", json!(1))) {
            handle.dispatch_batch(vec![change("age", json!(2)), register("name", json!("Ada"))]);
        }
    });

    let values = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&values);
    let _field = store.subscribe_field(form("profile"), field("age"), move |view| {
        sink.lock().unwrap().push(view.map(|view| view.value.clone()));
    });
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    let _form = store.subscribe_form(form("profile"), move |view| {
        sink.lock().unwrap().push(view.map(|view| view.field_names.len()));
    });

    store.dispatch(change("age", json!(1)));

    assert_eq!(
        store.state().field("profile", "age").unwrap().value,
        json!(2)
    );
    assert_eq!(*values.lock().unwrap(), vec![Some(json!(2))]);
    assert_eq!(*names.lock().unwrap(), vec![Some(2)]);
}

#[test]
fn store_uses_reducer_options() {
    let store = FormStore::new(ReducerOptions {
        submit_failure: SubmitFailureStatus::Invalid,
        ..ReducerOptions::default()
    });
    store.dispatch(register("age", json!(30)));
    store.dispatch(change("age", json!(31)));
    store.dispatch(Action::SubmitForm {
        form: form("profile"),
    });
    store.dispatch(Action::SubmitFormFail {
        form: form("profile"),
        error: Some("down".into()),
        validation_errors: ValidationErrors::new(),
    });
    assert_eq!(
        store.state().form("profile").unwrap().status(),
        FormStatus::Invalid
    );
}

// ============================================================================
// Batching
// ============================================================================

#[tokio::test(start_paused = true)]
async fn batcher_flushes_after_window() {
    let store = FormStore::default();
    let rounds = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&rounds);
    let _sub = store.subscribe(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let batcher = DispatchBatcher::new(
        store.clone(),
        DispatchMode::Batched(Duration::from_millis(16)),
    );
    batcher.push(register("age", json!(30)));
    batcher.push(change("age", json!(31)));
    assert!(store.state().is_empty());

    sleep(Duration::from_millis(20)).await;

    assert_eq!(batcher.flush(), 0);
    assert_eq!(rounds.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.state().field("profile", "age").unwrap().value,
        json!(31)
    );
}

#[tokio::test(start_paused = true)]
async fn explicit_flush_commits_early() {
    let store = FormStore::default();
    let batcher = DispatchBatcher::new(
        store.clone(),
        DispatchMode::Batched(Duration::from_millis(100)),
    );
    batcher.push(register("age", json!(30)));

    assert_eq!(batcher.flush(), 1);
    assert!(store.state().field("profile", "age").is_some());
    assert_eq!(batcher.flush(), 0);
}

#[tokio::test(start_paused = true)]
async fn explicit_flush_disarms_the_timer() {
    let store = FormStore::default();
    let batcher = DispatchBatcher::new(
        store.clone(),
        DispatchMode::Batched(Duration::from_millis(100)),
    );
    batcher.push(register("age", json!(30)));
    assert_eq!(batcher.flush(), 1);

    sleep(Duration::from_millis(50)).await;
    batcher.push(register("name", json!("Ada")));

    // The first timer comes due at 100ms and must leave the new batch alone.
    sleep(Duration::from_millis(70)).await;
    assert!(store.state().field("profile", "name").is_none());

    sleep(Duration::from_millis(40)).await;
    assert!(store.state().field("profile", "name").is_some());
}

#[test]
fn immediate_batcher_dispatches_on_push() {
    let store = FormStore::default();
    let batcher = DispatchBatcher::new(store.clone(), DispatchMode::Immediate);
    batcher.push(register("age", json!(30)));

    assert_eq!(batcher.flush(), 0);
    assert!(store.state().field("profile", "age").is_some());
}

#[test]
fn batcher_without_runtime_flushes_immediately() {
    let store = FormStore::default();
    let batcher = DispatchBatcher::new(
        store.clone(),
        DispatchMode::Batched(Duration::from_millis(16)),
    );
    batcher.push(register("age", json!(30)));
    assert!(store.state().field("profile", "age").is_some());
}

#[tokio::test(start_paused = true)]
async fn engine_batcher_validates_final_value() {
    let (validator, mut calls) = gated();
    let engine = FormEngine::builder()
        .settings(Settings {
            engine: EngineOptions {
                dispatch: DispatchMode::Batched(Duration::from_millis(16)),
                ..EngineOptions::default()
            },
            ..Settings::default()
        })
        .build();
    engine.register_field(
        &form("profile"),
        &field("age"),
        json!(30),
        RegisterOptions::new().inline_validator(validator),
    );

    let batcher = engine.batcher();
    batcher.push(change("age", json!(17)));
    batcher.push(change("age", json!(16)));

    let call = calls.recv().await.unwrap();
    assert_eq!(call.value, json!(16));
    assert_eq!(status_of(&engine, "profile", "age"), FieldStatus::Validating);
    call.resolve(Err(FieldError::message("too young")));

    while status_of(&engine, "profile", "age") == FieldStatus::Validating {
        yield_now().await;
    }
    assert_eq!(status_of(&engine, "profile", "age"), FieldStatus::Invalid);
    assert_eq!(engine.form("profile").unwrap().status, FormStatus::Invalid);
    assert!(calls.try_recv().is_err());
}

#[tokio::test]
async fn engine_batcher_validates_late_registrations() {
    let mut validators = ValidatorRegistry::new();
    validators.register("never", reject_all("nope")).unwrap();
    let engine = FormEngine::builder().validators(validators).build();
    engine.register_field(&form("profile"), &field("name"), json!("Ada"), RegisterOptions::new());
    engine.change_value(&form("profile"), &field("name"), json!("Grace"));

    engine.batcher().push(Action::RegisterField {
        form: form("profile"),
        field: field("email"),
        value: json!(""),
        validate: Some(ValidatorRef::Named("never".into())),
        meta: Meta::new(),
    });

    while status_of(&engine, "profile", "email") == FieldStatus::Validating {
        yield_now().await;
    }
    assert_eq!(status_of(&engine, "profile", "email"), FieldStatus::Invalid);
    assert_eq!(engine.form("profile").unwrap().status, FormStatus::Invalid);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn change_without_validator_needs_no_validation() {
    let engine = FormEngine::default();
    let (profile, age) = (form("profile"), field("age"));
    engine.register_field(&profile, &age, json!(30), RegisterOptions::new());

    let handle = engine.change_value(&profile, &age, json!(25));
    assert!(handle.is_finished());
    assert_eq!(handle.outcome().await, ValidationOutcome::NotRequired);
    assert_eq!(status_of(&engine, "profile", "age"), FieldStatus::Valid);
}

#[tokio::test]
async fn change_on_unregistered_field_is_ignored() {
    let engine = FormEngine::default();
    let handle = engine.change_value(&form("profile"), &field("ghost"), json!(1));
    assert_eq!(handle.outcome().await, ValidationOutcome::NotRequired);
    assert!(engine.state().is_empty());
}

#[tokio::test]
async fn named_validator_result_is_applied() {
    let mut validators = ValidatorRegistry::new();
    validators
        .register("adult", |value: Value, _form: Arc<FormRecord>| async move {
            if value.as_i64().unwrap_or(0) >= 18 {
                Ok(())
            } else {
                Err(FieldError::message("must be an adult"))
            }
        })
        .unwrap();
    let engine = FormEngine::builder().validators(validators).build();
    let (profile, age) = (form("profile"), field("age"));
    engine.register_field(&profile, &age, json!(30), RegisterOptions::new().validator("adult"));

    let outcome = engine.change_value(&profile, &age, json!(17)).outcome().await;
    assert_eq!(outcome, ValidationOutcome::Applied(FieldStatus::Invalid));
    let view = engine.field("profile", "age").unwrap();
    assert_eq!(view.messages, vec!["must be an adult"]);
    assert!(!view.loading);

    let outcome = engine.change_value(&profile, &age, json!(40)).outcome().await;
    assert_eq!(outcome, ValidationOutcome::Applied(FieldStatus::Valid));
    assert!(engine.can_submit("profile"));
}

#[tokio::test]
async fn validator_sees_form_snapshot() {
    let engine = FormEngine::default();
    let (signup, password, confirm) = (form("signup"), field("password"), field("confirm"));
    engine.register_field(&signup, &password, json!("hunter2"), RegisterOptions::new());
    engine.register_field(
        &signup,
        &confirm,
        json!(""),
        RegisterOptions::new().inline_validator(|value: Value, form: Arc<FormRecord>| async move {
            let password = form.field("password").map(|field| field.value.clone());
            if password == Some(value) {
                Ok(())
            } else {
                Err(FieldError::message("passwords differ"))
            }
        }),
    );

    let outcome = engine.change_value(&signup, &confirm, json!("hunter3")).outcome().await;
    assert_eq!(outcome, ValidationOutcome::Applied(FieldStatus::Invalid));
    let outcome = engine.change_value(&signup, &confirm, json!("hunter2")).outcome().await;
    assert_eq!(outcome, ValidationOutcome::Applied(FieldStatus::Valid));
}

#[tokio::test]
async fn stale_result_is_discarded() {
    let (validator, mut calls) = gated();
    let engine = FormEngine::default();
    let (results, _sub) = result_dispatches(engine.store());
    let (signup, code) = (form("signup"), field("code"));
    engine.register_field(&signup, &code, json!(""), RegisterOptions::new().inline_validator(validator));

    let first = engine.change_value(&signup, &code, json!("A"));
    let call_a = calls.recv().await.unwrap();
    let second = engine.change_value(&signup, &code, json!("B"));
    let call_b = calls.recv().await.unwrap();
    assert_eq!(call_a.value, json!("A"));
    assert_eq!(call_b.value, json!("B"));

    call_a.resolve(Err(FieldError::message("taken")));
    assert_eq!(
        first.outcome().await,
        ValidationOutcome::Discarded(StaleReason::ValueChanged)
    );
    assert_eq!(results.load(Ordering::SeqCst), 0);
    assert_eq!(status_of(&engine, "signup", "code"), FieldStatus::Validating);

    call_b.resolve(Ok(()));
    assert_eq!(
        second.outcome().await,
        ValidationOutcome::Applied(FieldStatus::Valid)
    );
    assert_eq!(results.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn later_result_wins_even_when_it_lands_first() {
    let (validator, mut calls) = gated();
    let engine = FormEngine::default();
    let (signup, code) = (form("signup"), field("code"));
    engine.register_field(&signup, &code, json!(""), RegisterOptions::new().inline_validator(validator));

    let first = engine.change_value(&signup, &code, json!("A"));
    let call_a = calls.recv().await.unwrap();
    let second = engine.change_value(&signup, &code, json!("B"));
    let call_b = calls.recv().await.unwrap();

    call_b.resolve(Err(FieldError::message("taken")));
    assert_eq!(
        second.outcome().await,
        ValidationOutcome::Applied(FieldStatus::Invalid)
    );
    call_a.resolve(Ok(()));
    assert_eq!(
        first.outcome().await,
        ValidationOutcome::Discarded(StaleReason::ValueChanged)
    );
    assert_eq!(status_of(&engine, "signup", "code"), FieldStatus::Invalid);
}

#[tokio::test]
async fn result_for_reset_field_is_discarded() {
    let (validator, mut calls) = gated();
    let engine = FormEngine::default();
    let (signup, code) = (form("signup"), field("code"));
    engine.register_field(&signup, &code, json!("A"), RegisterOptions::new().inline_validator(validator));

    // Back to the registered value, then reset: same value, INITIAL status.
    let handle = engine.change_value(&signup, &code, json!("A"));
    let call = calls.recv().await.unwrap();
    engine.reset_field(&signup, &code);

    call.resolve(Err(FieldError::message("taken")));
    assert_eq!(
        handle.outcome().await,
        ValidationOutcome::Discarded(StaleReason::FieldReset)
    );
    assert_eq!(status_of(&engine, "signup", "code"), FieldStatus::Initial);
}

#[tokio::test]
async fn result_for_unregistered_field_is_discarded() {
    let (validator, mut calls) = gated();
    let engine = FormEngine::default();
    let (signup, code) = (form("signup"), field("code"));
    engine.register_field(&signup, &code, json!(""), RegisterOptions::new().inline_validator(validator));

    let handle = engine.change_value(&signup, &code, json!("A"));
    let call = calls.recv().await.unwrap();
    engine.unregister_field(&signup, &code);

    call.resolve(Ok(()));
    assert_eq!(
        handle.outcome().await,
        ValidationOutcome::Discarded(StaleReason::FieldRemoved)
    );
    assert!(engine.state().form("signup").is_none());
}

#[tokio::test]
async fn late_registration_is_validated() {
    let mut validators = ValidatorRegistry::new();
    validators.register("never", reject_all("nope")).unwrap();
    let engine = FormEngine::builder().validators(validators).build();
    let (profile, name, email) = (form("profile"), field("name"), field("email"));

    engine.register_field(&profile, &name, json!("Ada"), RegisterOptions::new());
    engine.change_value(&profile, &name, json!("Grace"));
    assert!(engine.can_submit("profile"));

    let handle = engine.register_field(&profile, &email, json!(""), RegisterOptions::new().validator("never"));
    assert_eq!(
        handle.outcome().await,
        ValidationOutcome::Applied(FieldStatus::Invalid)
    );
    assert_eq!(engine.form("profile").unwrap().status, FormStatus::Invalid);
}

#[tokio::test]
async fn late_registration_without_validator_is_valid() {
    let engine = FormEngine::default();
    let (profile, name, email) = (form("profile"), field("name"), field("email"));
    engine.register_field(&profile, &name, json!("Ada"), RegisterOptions::new());
    engine.change_value(&profile, &name, json!("Grace"));

    let handle = engine.register_field(&profile, &email, json!(""), RegisterOptions::new());
    assert_eq!(
        handle.outcome().await,
        ValidationOutcome::Applied(FieldStatus::Valid)
    );
}

#[tokio::test]
async fn late_registration_can_be_skipped() {
    let engine = FormEngine::builder()
        .settings(Settings {
            engine: EngineOptions {
                late_registration: LateRegistration::Skip,
                ..EngineOptions::default()
            },
            ..Settings::default()
        })
        .build();
    let (profile, name, email) = (form("profile"), field("name"), field("email"));
    engine.register_field(&profile, &name, json!("Ada"), RegisterOptions::new());
    engine.change_value(&profile, &name, json!("Grace"));

    let handle = engine.register_field(&profile, &email, json!(""), RegisterOptions::new());
    assert_eq!(handle.outcome().await, ValidationOutcome::NotRequired);
    assert_eq!(status_of(&engine, "profile", "email"), FieldStatus::Initial);
}

#[tokio::test]
async fn registration_into_pristine_form_is_not_validated() {
    let engine = FormEngine::default();
    let (profile, name, email) = (form("profile"), field("name"), field("email"));
    engine.register_field(&profile, &name, json!("Ada"), RegisterOptions::new());
    let handle = engine.register_field(
        &profile,
        &email,
        json!(""),
        RegisterOptions::new().inline_validator(reject_all("nope")),
    );
    assert_eq!(handle.outcome().await, ValidationOutcome::NotRequired);
    assert_eq!(status_of(&engine, "profile", "email"), FieldStatus::Initial);
}

#[tokio::test]
async fn initial_value_change_revalidates_pending_untouched_field() {
    let (validator, mut calls) = gated();
    let engine = FormEngine::default();
    let (profile, nick) = (form("profile"), field("nick"));
    engine.register_field(&profile, &nick, json!("a"), RegisterOptions::new().inline_validator(validator));

    let first = engine.change_value_with(&profile, &nick, json!("b"), ChangeOptions::default().silent());
    let call_b = calls.recv().await.unwrap();
    assert!(!engine.field("profile", "nick").unwrap().touched);

    let second = engine.change_initial_value(&profile, &nick, json!("c"), Meta::new());
    let call_c = calls.recv().await.unwrap();
    assert_eq!(call_c.value, json!("c"));

    call_b.resolve(Ok(()));
    call_c.resolve(Err(FieldError::message("reserved")));
    assert_eq!(
        first.outcome().await,
        ValidationOutcome::Discarded(StaleReason::ValueChanged)
    );
    assert_eq!(
        second.outcome().await,
        ValidationOutcome::Applied(FieldStatus::Invalid)
    );
}

#[tokio::test]
async fn initial_value_change_on_settled_field_does_not_validate() {
    let engine = FormEngine::default();
    let (profile, nick) = (form("profile"), field("nick"));
    engine.register_field(&profile, &nick, json!("a"), RegisterOptions::new().inline_validator(accept_all()));

    let handle = engine.change_initial_value(&profile, &nick, json!("b"), Meta::new());
    assert_eq!(handle.outcome().await, ValidationOutcome::NotRequired);
    let view = engine.field("profile", "nick").unwrap();
    assert_eq!(view.value, json!("b"));
    assert_eq!(view.status, FieldStatus::Initial);
}

#[tokio::test]
async fn unresolvable_validator_counts_as_valid() {
    let engine = FormEngine::default();
    let (profile, age) = (form("profile"), field("age"));
    engine.register_field(&profile, &age, json!(30), RegisterOptions::new().validator("missing"));

    let handle = engine.change_value(&profile, &age, json!(31));
    assert!(handle.is_finished());
    assert_eq!(
        handle.outcome().await,
        ValidationOutcome::Applied(FieldStatus::Valid)
    );
}

#[tokio::test]
async fn panicking_validator_marks_field_invalid() {
    let engine = FormEngine::default();
    let (profile, age) = (form("profile"), field("age"));
    engine.register_field(
        &profile,
        &age,
        json!(30),
        RegisterOptions::new().inline_validator(|_value: Value, _form: Arc<FormRecord>| async move {
            if true {
                panic!("validator exploded");
            }
            Ok::<(), FieldError>(())
        }),
    );

    let outcome = engine.change_value(&profile, &age, json!(31)).outcome().await;
    assert_eq!(outcome, ValidationOutcome::Applied(FieldStatus::Invalid));
    let view = engine.field("profile", "age").unwrap();
    assert_eq!(view.messages, vec!["validator panicked: validator exploded"]);
}

#[tokio::test(start_paused = true)]
async fn slow_validator_times_out() {
    let engine = FormEngine::builder()
        .settings(Settings {
            engine: EngineOptions {
                validator_timeout: Some(Duration::from_secs(1)),
                ..EngineOptions::default()
            },
            ..Settings::default()
        })
        .build();
    let (profile, age) = (form("profile"), field("age"));
    engine.register_field(
        &profile,
        &age,
        json!(30),
        RegisterOptions::new().inline_validator(|_value: Value, _form: Arc<FormRecord>| async move {
            sleep(Duration::from_secs(10)).await;
            Ok::<(), FieldError>(())
        }),
    );

    let outcome = engine.change_value(&profile, &age, json!(31)).outcome().await;
    assert_eq!(outcome, ValidationOutcome::Applied(FieldStatus::Invalid));
    assert_eq!(
        engine.field("profile", "age").unwrap().messages,
        vec!["validation timed out after 1000ms"]
    );
}

#[tokio::test]
async fn aborted_validation_reports_aborted() {
    let (validator, mut calls) = gated();
    let engine = FormEngine::default();
    let (profile, age) = (form("profile"), field("age"));
    engine.register_field(&profile, &age, json!(30), RegisterOptions::new().inline_validator(validator));

    let handle = engine.change_value(&profile, &age, json!(31));
    let _call = calls.recv().await.unwrap();
    handle.abort();
    assert_eq!(handle.outcome().await, ValidationOutcome::Aborted);
    assert_eq!(status_of(&engine, "profile", "age"), FieldStatus::Validating);
}

#[tokio::test]
async fn reset_store_drops_inline_validators() {
    let engine = FormEngine::default();
    let (profile, age) = (form("profile"), field("age"));
    engine.register_field(
        &profile,
        &age,
        json!(30),
        RegisterOptions::new().inline_validator(reject_all("nope")),
    );
    engine.reset_store();
    assert!(engine.state().is_empty());

    engine.store().dispatch(Action::RegisterField {
        form: profile.clone(),
        field: age.clone(),
        value: json!(30),
        validate: Some(ValidatorRef::Inline),
        meta: Meta::new(),
    });
    let outcome = engine.change_value(&profile, &age, json!(31)).outcome().await;
    assert_eq!(outcome, ValidationOutcome::Applied(FieldStatus::Valid));
}

// ============================================================================
// Submission
// ============================================================================

fn valid_profile(engine: &FormEngine) {
    let profile = form("profile");
    engine.register_field(&profile, &field("name"), json!("Ada"), RegisterOptions::new());
    engine.register_field(&profile, &field("age"), json!(30), RegisterOptions::new());
    engine.change_value(&profile, &field("name"), json!("Grace"));
    engine.change_value(&profile, &field("age"), json!(31));
    assert!(engine.can_submit("profile"));
}

#[tokio::test]
async fn submit_unknown_form() {
    let engine = FormEngine::default();
    let err = engine.submit_form(&form("ghost")).await.unwrap_err();
    assert_eq!(err, SubmitError::UnknownForm(form("ghost")));
}

#[tokio::test]
async fn submit_requires_valid_form() {
    let engine = FormEngine::default();
    engine.register_field(&form("profile"), &field("age"), json!(30), RegisterOptions::new());

    let err = engine.submit_form(&form("profile")).await.unwrap_err();
    assert_eq!(
        err,
        SubmitError::NotSubmittable {
            form: form("profile"),
            status: FormStatus::Initial,
        }
    );
    assert_eq!(engine.form("profile").unwrap().status, FormStatus::Initial);
}

#[tokio::test]
async fn successful_submit_passes_values_and_resets() {
    let engine = FormEngine::default();
    valid_profile(&engine);

    let received = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&received);
    let result = engine
        .submit_form_with(&form("profile"), move |values: BTreeMap<FieldName, Value>| {
            *sink.lock().unwrap() = Some(values);
            async { Ok::<_, anyhow::Error>(json!({ "id": 7 })) }
        })
        .await
        .unwrap();

    assert_eq!(result, json!({ "id": 7 }));
    let values = received.lock().unwrap().clone().unwrap();
    assert_eq!(values.get("name"), Some(&json!("Grace")));
    assert_eq!(values.get("age"), Some(&json!(31)));

    let view = engine.form("profile").unwrap();
    assert_eq!(view.status, FormStatus::Initial);
    assert_eq!(engine.field("profile", "name").unwrap().value, json!("Ada"));
    assert!(!engine.field("profile", "name").unwrap().touched);
}

#[tokio::test]
async fn submit_without_submitter_resolves_null() {
    let engine = FormEngine::default();
    valid_profile(&engine);
    assert_eq!(engine.submit_form(&form("profile")).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn registered_submitter_is_used() {
    let engine = FormEngine::builder()
        .submitter(form("profile"), |values: BTreeMap<FieldName, Value>| async move {
            Ok::<_, anyhow::Error>(json!(values.len()))
        })
        .build();
    valid_profile(&engine);
    assert_eq!(engine.submit_form(&form("profile")).await.unwrap(), json!(2));
}

#[tokio::test]
async fn rejected_submit_records_error() {
    let engine = FormEngine::default();
    valid_profile(&engine);

    let err = engine
        .submit_form_with(&form("profile"), |_values: BTreeMap<FieldName, Value>| async {
            Err::<Value, _>(anyhow!("server down"))
        })
        .await
        .unwrap_err();

    assert_eq!(err, SubmitError::Rejected("server down".into()));
    let view = engine.form("profile").unwrap();
    assert_eq!(view.submit_error.as_deref(), Some("server down"));
    assert_eq!(view.status, FormStatus::Valid);
    assert!(view.can_submit);
}

#[tokio::test]
async fn panicking_submitter_is_a_rejection() {
    let engine = FormEngine::default();
    valid_profile(&engine);

    let err = engine
        .submit_form_with(&form("profile"), |_values: BTreeMap<FieldName, Value>| async {
            if true {
                panic!("submitter exploded");
            }
            Ok::<_, anyhow::Error>(Value::Null)
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SubmitError::Rejected("submitter panicked: submitter exploded".into())
    );
    assert!(!engine.form("profile").unwrap().submitting);
}

#[tokio::test]
async fn submit_revalidates_every_field() {
    let taken = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&taken);
    let engine = FormEngine::default();
    let profile = form("profile");
    engine.register_field(
        &profile,
        &field("name"),
        json!("ada"),
        RegisterOptions::new().inline_validator(move |_value: Value, _form: Arc<FormRecord>| {
            let taken = flag.load(Ordering::SeqCst);
            async move {
                if taken {
                    Err(FieldError::message("name taken"))
                } else {
                    Ok(())
                }
            }
        }),
    );
    engine.register_field(&profile, &field("age"), json!(30), RegisterOptions::new().inline_validator(accept_all()));

    let name_check = engine.change_value(&profile, &field("name"), json!("grace"));
    let age_check = engine.change_value(&profile, &field("age"), json!(31));
    assert_eq!(name_check.outcome().await, ValidationOutcome::Applied(FieldStatus::Valid));
    assert_eq!(age_check.outcome().await, ValidationOutcome::Applied(FieldStatus::Valid));
    assert!(engine.can_submit("profile"));

    taken.store(true, Ordering::SeqCst);
    let submitted = Arc::new(AtomicBool::new(false));
    let called = Arc::clone(&submitted);
    let err = engine
        .submit_form_with(&profile, move |_values: BTreeMap<FieldName, Value>| {
            called.store(true, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(Value::Null) }
        })
        .await
        .unwrap_err();

    let SubmitError::Validation(errors) = err else {
        panic!("expected validation failure, got {err:?}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.get("name"), Some(&FieldError::message("name taken")));
    assert!(!submitted.load(Ordering::SeqCst));

    let state = engine.state();
    assert_eq!(state.form("profile").unwrap().status(), FormStatus::Invalid);
    assert_eq!(state.field("profile", "name").unwrap().status, FieldStatus::Invalid);
    assert_eq!(state.field("profile", "age").unwrap().status, FieldStatus::Valid);
}

#[tokio::test]
async fn submit_time_error_for_a_replaced_value_is_dropped() {
    let (validator, mut calls) = gated();
    let engine = FormEngine::default();
    let (profile, age) = (form("profile"), field("age"));
    engine.register_field(&profile, &age, json!(30), RegisterOptions::new().inline_validator(validator));

    let check = engine.change_value(&profile, &age, json!(17));
    calls.recv().await.unwrap().resolve(Ok(()));
    assert_eq!(check.outcome().await, ValidationOutcome::Applied(FieldStatus::Valid));

    let submission = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.submit_form(&form("profile")).await })
    };
    let submit_call = calls.recv().await.unwrap();
    assert_eq!(submit_call.value, json!(17));

    // The user edits the field while the submit-time check is still running.
    let edit = engine.change_value(&profile, &age, json!(31));
    calls.recv().await.unwrap().resolve(Ok(()));
    assert_eq!(edit.outcome().await, ValidationOutcome::Applied(FieldStatus::Valid));

    submit_call.resolve(Err(FieldError::message("too young")));
    let err = submission.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        SubmitError::Validation(BTreeMap::from([(
            age.clone(),
            FieldError::message("too young")
        )]))
    );

    let view = engine.field("profile", "age").unwrap();
    assert_eq!(view.value, json!(31));
    assert_eq!(view.status, FieldStatus::Valid);
    assert!(view.messages.is_empty());
    let form_view = engine.form("profile").unwrap();
    assert_eq!(form_view.status, FormStatus::Valid);
    assert!(form_view.can_submit);
}

#[tokio::test]
async fn second_submit_is_rejected_while_submitting() {
    let engine = FormEngine::default();
    valid_profile(&engine);

    let (release, wait) = oneshot::channel::<()>();
    let wait = Arc::new(Mutex::new(Some(wait)));
    let first = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .submit_form_with(&form("profile"), move |_values: BTreeMap<FieldName, Value>| {
                    let wait = wait.lock().unwrap().take();
                    async move {
                        if let Some(wait) = wait {
                            let _ = wait.await;
                        }
                        Ok::<_, anyhow::Error>(json!("done"))
                    }
                })
                .await
        })
    };

    while !engine.form("profile").unwrap().submitting {
        yield_now().await;
    }
    let err = engine.submit_form(&form("profile")).await.unwrap_err();
    assert_eq!(
        err,
        SubmitError::NotSubmittable {
            form: form("profile"),
            status: FormStatus::Submitting,
        }
    );
    assert!(engine.field("profile", "age").unwrap().submitting);

    release.send(()).unwrap();
    assert_eq!(first.await.unwrap().unwrap(), json!("done"));
}

// ============================================================================
// Reads
// ============================================================================

#[test]
fn engine_selectors_read_current_state() {
    let engine = FormEngine::default();
    let profile = form("profile");
    engine.store().dispatch(register("age", json!(30)));
    engine.store().dispatch(register("name", json!("Ada")));
    engine.update_meta(&profile, &field("age"), Meta::new().with("label", "Age"));

    assert!(engine.is_field_registered("profile", "age"));
    assert!(!engine.is_field_registered("profile", "email"));
    assert_eq!(engine.field_names("profile"), vec![field("age"), field("name")]);
    assert_eq!(engine.form_values("profile").get("name"), Some(&json!("Ada")));
    assert_eq!(
        engine.field("profile", "age").unwrap().meta.get("label"),
        Some(&json!("Age"))
    );

    engine.reset_form(&profile);
    engine.unregister_field(&profile, &field("age"));
    assert_eq!(engine.field_names("profile"), vec![field("name")]);
}

#[test]
fn batcher_uses_configured_window() {
    let engine = FormEngine::builder()
        .settings(Settings {
            engine: EngineOptions {
                dispatch: DispatchMode::Batched(Duration::from_millis(16)),
                ..EngineOptions::default()
            },
            ..Settings::default()
        })
        .build();
    assert_eq!(engine.batcher().window(), Duration::from_millis(16));
}

#[test]
fn shared_store_is_used_as_is() {
    let store = FormStore::default();
    let engine = FormEngine::builder().store(store.clone()).build();
    store.dispatch(register("age", json!(30)));
    assert!(engine.is_field_registered("profile", "age"));
}
