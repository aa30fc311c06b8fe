//! Listener registry owned by one store.
//!
//! Field and form listeners remember the last view they were given and are
//! only called when the freshly derived view differs from it. Forms whose
//! record `Arc` did not change in a commit are skipped without deriving
//! anything. Each watch also remembers the commit its view came from and
//! ignores events from earlier commits, which arrive late when a listener
//! dispatches from inside its callback.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use formstate_core::selectors::{field_view, form_view};
use formstate_core::{FieldView, FormView};
use formstate_types::{FieldName, FormName, FormState};

use crate::store::StoreEvent;

type StoreListener = Box<dyn Fn(&StoreEvent<'_>) + Send + Sync>;
type FieldListener = Box<dyn Fn(Option<&FieldView>) + Send + Sync>;
type FormListener = Box<dyn Fn(Option<&FormView>) + Send + Sync>;

struct Seen<T> {
    sequence: u64,
    view: Option<T>,
}

impl<T> Seen<T> {
    fn new(sequence: u64, view: Option<T>) -> Mutex<Self> {
        Mutex::new(Self { sequence, view })
    }
}

struct FieldWatch {
    form: FormName,
    field: FieldName,
    last: Mutex<Seen<FieldView>>,
    listener: FieldListener,
}

struct FormWatch {
    form: FormName,
    last: Mutex<Seen<FormView>>,
    listener: FormListener,
}

enum Entry {
    Store(StoreListener),
    Field(FieldWatch),
    Form(FormWatch),
}

impl Entry {
    fn notify(&self, event: &StoreEvent<'_>) {
        match self {
            Entry::Store(listener) => listener(event),
            Entry::Field(watch) => {
                if form_unchanged(event, &watch.form) {
                    return;
                }
                let view = field_view(event.next, &watch.form, &watch.field);
                if replace_if_changed(&watch.last, event.sequence, view.as_ref()) {
                    (watch.listener)(view.as_ref());
                }
            }
            Entry::Form(watch) => {
                if form_unchanged(event, &watch.form) {
                    return;
                }
                let view = form_view(event.next, &watch.form);
                if replace_if_changed(&watch.last, event.sequence, view.as_ref()) {
                    (watch.listener)(view.as_ref());
                }
            }
        }
    }
}

fn form_unchanged(event: &StoreEvent<'_>, form: &FormName) -> bool {
    let lookup = |state: &FormState| state.form(form).cloned();
    match (lookup(event.prev), lookup(event.next)) {
        (Some(prev), Some(next)) => Arc::ptr_eq(&prev, &next),
        (None, None) => true,
        _ => false,
    }
}

/// Store `view` as the last seen one. Returns false if it was already that,
/// or if a later commit has been seen.
fn replace_if_changed<T: Clone + PartialEq>(
    last: &Mutex<Seen<T>>,
    sequence: u64,
    view: Option<&T>,
) -> bool {
    let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
    if sequence <= last.sequence {
        return false;
    }
    last.sequence = sequence;
    if last.view.as_ref() == view {
        return false;
    }
    last.view = view.cloned();
    true
}

#[derive(Default)]
pub(crate) struct Subscriptions {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<u64, Arc<Entry>>>,
}

impl Subscriptions {
    pub(crate) fn add_store(
        self: &Arc<Self>,
        listener: impl Fn(&StoreEvent<'_>) + Send + Sync + 'static,
    ) -> Subscription {
        self.insert(Entry::Store(Box::new(listener)))
    }

    pub(crate) fn add_field(
        self: &Arc<Self>,
        form: FormName,
        field: FieldName,
        sequence: u64,
        current: Option<FieldView>,
        listener: impl Fn(Option<&FieldView>) + Send + Sync + 'static,
    ) -> Subscription {
        self.insert(Entry::Field(FieldWatch {
            form,
            field,
            last: Seen::new(sequence, current),
            listener: Box::new(listener),
        }))
    }

    pub(crate) fn add_form(
        self: &Arc<Self>,
        form: FormName,
        sequence: u64,
        current: Option<FormView>,
        listener: impl Fn(Option<&FormView>) + Send + Sync + 'static,
    ) -> Subscription {
        self.insert(Entry::Form(FormWatch {
            form,
            last: Seen::new(sequence, current),
            listener: Box::new(listener),
        }))
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Call every listener registered at the time of the call.
    pub(crate) fn notify(&self, event: &StoreEvent<'_>) {
        let entries: Vec<Arc<Entry>> = self.lock().values().cloned().collect();
        for entry in entries {
            entry.notify(event);
        }
    }

    fn insert(self: &Arc<Self>, entry: Entry) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, Arc::new(entry));
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<Entry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its listener"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Subscriptions>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
