//! The shared state store.
//!
//! One mutex holds the current snapshot and its commit number. Every
//! dispatch runs the reducer under the lock and swaps the `Arc`, so
//! dispatches are applied one at a time in issue order and readers only ever
//! see whole snapshots. Listeners are notified after the lock is released and
//! may read or dispatch from inside the callback.

use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use formstate_core::selectors::{field_view, form_view};
use formstate_core::{FieldView, FormView, Reducer};
use formstate_types::{Action, FieldName, FormName, FormState, ReducerOptions};

use crate::subscriptions::{Subscription, Subscriptions};

/// One committed update, as seen by store-wide listeners.
#[derive(Debug, Clone, Copy)]
pub struct StoreEvent<'a> {
    /// Actions applied in this update, in order. More than one for batches.
    pub actions: &'a [Action],
    /// Commit number of `next`. Events dispatched from inside a listener
    /// reach later listeners before the outer event does, so the number is
    /// what orders them.
    pub sequence: u64,
    pub prev: &'a Arc<FormState>,
    pub next: &'a Arc<FormState>,
}

impl StoreEvent<'_> {
    /// False when every action was a no-op.
    #[must_use]
    pub fn changed(&self) -> bool {
        !Arc::ptr_eq(self.prev, self.next)
    }
}

/// Snapshots on both sides of a commit.
#[derive(Debug, Clone)]
pub(crate) struct Transition {
    pub(crate) prev: Arc<FormState>,
    pub(crate) next: Arc<FormState>,
}

struct Head {
    state: Arc<FormState>,
    sequence: u64,
}

struct StoreInner {
    reducer: Reducer,
    head: Mutex<Head>,
    subscriptions: Arc<Subscriptions>,
}

/// Cheaply clonable handle to one store instance.
#[derive(Clone)]
pub struct FormStore {
    inner: Arc<StoreInner>,
}

impl Default for FormStore {
    fn default() -> Self {
        Self::new(ReducerOptions::default())
    }
}

impl fmt::Debug for FormStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormStore")
            .field("reducer", &self.inner.reducer)
            .field("forms", &self.state().len())
            .finish_non_exhaustive()
    }
}

impl FormStore {
    #[must_use]
    pub fn new(options: ReducerOptions) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                reducer: Reducer::new(options),
                head: Mutex::new(Head {
                    state: Arc::new(FormState::new()),
                    sequence: 0,
                }),
                subscriptions: Arc::new(Subscriptions::default()),
            }),
        }
    }

    #[must_use]
    pub fn reducer(&self) -> Reducer {
        self.inner.reducer
    }

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<FormState> {
        Arc::clone(&self.lock_head().state)
    }

    /// Apply one action. Returns the snapshot it produced.
    pub fn dispatch(&self, action: Action) -> Arc<FormState> {
        self.transition(action).next
    }

    /// Apply `actions` as a single state replacement with a single round of
    /// notifications. An empty batch changes nothing and notifies nobody.
    pub fn dispatch_batch(&self, actions: Vec<Action>) -> Arc<FormState> {
        if actions.is_empty() {
            return self.state();
        }
        self.commit_all(actions).next
    }

    /// Decide on an action from the current snapshot and apply it, atomically
    /// with respect to every other dispatch.
    ///
    /// When `plan` returns `Err`, nothing is dispatched and the error is
    /// handed back.
    pub fn dispatch_with<E>(
        &self,
        plan: impl FnOnce(&FormState) -> Result<Action, E>,
    ) -> Result<Arc<FormState>, E> {
        self.commit(|state| plan(state).map(|action| vec![action]))
            .map(|transition| transition.next)
    }

    /// Notify `listener` of every committed update.
    pub fn subscribe(
        &self,
        listener: impl Fn(&StoreEvent<'_>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.subscriptions.add_store(listener)
    }

    /// Notify `listener` whenever the view of one field changes. It receives
    /// `None` once the field is gone.
    pub fn subscribe_field(
        &self,
        form: FormName,
        field: FieldName,
        listener: impl Fn(Option<&FieldView>) + Send + Sync + 'static,
    ) -> Subscription {
        let (state, sequence) = self.head();
        let current = field_view(&state, &form, &field);
        self.inner
            .subscriptions
            .add_field(form, field, sequence, current, listener)
    }

    /// Notify `listener` whenever the view of one form changes. It receives
    /// `None` once the form is gone.
    pub fn subscribe_form(
        &self,
        form: FormName,
        listener: impl Fn(Option<&FormView>) + Send + Sync + 'static,
    ) -> Subscription {
        let (state, sequence) = self.head();
        let current = form_view(&state, &form);
        self.inner
            .subscriptions
            .add_form(form, sequence, current, listener)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    pub(crate) fn transition(&self, action: Action) -> Transition {
        self.commit_all(vec![action])
    }

    pub(crate) fn commit_all(&self, actions: Vec<Action>) -> Transition {
        let Ok(transition) = self.commit(|_| Ok::<_, Infallible>(actions));
        transition
    }

    fn commit<E>(
        &self,
        plan: impl FnOnce(&FormState) -> Result<Vec<Action>, E>,
    ) -> Result<Transition, E> {
        let (actions, sequence, transition) = {
            let mut head = self.lock_head();
            let snapshot: &FormState = &head.state;
            let actions = plan(snapshot)?;

            let prev = Arc::clone(&head.state);
            let next = actions.iter().fold(Arc::clone(&prev), |state, action| {
                self.inner.reducer.reduce(&state, action)
            });
            head.state = Arc::clone(&next);
            head.sequence += 1;
            (actions, head.sequence, Transition { prev, next })
        };

        for action in &actions {
            match (action.form(), action.field()) {
                (Some(form), Some(field)) => {
                    tracing::debug!("Dispatched {} for {form}/{field}", action.kind().as_str());
                }
                (Some(form), None) => {
                    tracing::debug!("Dispatched {} for {form}", action.kind().as_str());
                }
                _ => tracing::debug!("Dispatched {}", action.kind().as_str()),
            }
        }

        self.inner.subscriptions.notify(&StoreEvent {
            actions: &actions,
            sequence,
            prev: &transition.prev,
            next: &transition.next,
        });
        Ok(transition)
    }

    fn head(&self) -> (Arc<FormState>, u64) {
        let head = self.lock_head();
        (Arc::clone(&head.state), head.sequence)
    }

    fn lock_head(&self) -> MutexGuard<'_, Head> {
        self.inner
            .head
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
