//! Optional batching in front of the store.
//!
//! Pushed actions are buffered and committed together, like
//! [`FormStore::dispatch_batch`], once the window elapses, so a burst of
//! updates costs one state swap and one round of notifications.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::sleep;

use formstate_types::{Action, DispatchMode};

use crate::store::{FormStore, Transition};

type AfterFlush = Arc<dyn Fn(&[Action], &Transition) + Send + Sync>;

#[derive(Default)]
struct Pending {
    actions: Vec<Action>,
    /// Bumped by every flush. A timer only flushes the batch it was armed for.
    generation: u64,
}

#[derive(Clone)]
pub struct DispatchBatcher {
    store: FormStore,
    window: Duration,
    pending: Arc<Mutex<Pending>>,
    after_flush: Option<AfterFlush>,
}

impl fmt::Debug for DispatchBatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchBatcher")
            .field("store", &self.store)
            .field("window", &self.window)
            .field("pending", &self.lock().actions.len())
            .finish_non_exhaustive()
    }
}

impl DispatchBatcher {
    /// `DispatchMode::Immediate` makes every push a plain dispatch.
    #[must_use]
    pub fn new(store: FormStore, mode: DispatchMode) -> Self {
        let window = match mode {
            DispatchMode::Immediate => Duration::ZERO,
            DispatchMode::Batched(window) => window,
        };
        Self {
            store,
            window,
            pending: Arc::new(Mutex::new(Pending::default())),
            after_flush: None,
        }
    }

    /// Run `hook` after every commit this batcher makes.
    pub(crate) fn after_flush(
        mut self,
        hook: impl Fn(&[Action], &Transition) + Send + Sync + 'static,
    ) -> Self {
        self.after_flush = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Buffer `action`. The first action of a batch arms the flush timer.
    ///
    /// Outside a tokio runtime there is no timer to arm, and the buffer is
    /// flushed right away.
    pub fn push(&self, action: Action) {
        if self.window.is_zero() {
            self.commit(vec![action]);
            return;
        }

        let armed = {
            let mut pending = self.lock();
            pending.actions.push(action);
            (pending.actions.len() == 1).then_some(pending.generation)
        };
        let Some(generation) = armed else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                let batcher = self.clone();
                handle.spawn(async move {
                    sleep(batcher.window).await;
                    batcher.flush_generation(Some(generation));
                });
            }
            Err(_) => {
                tracing::debug!("No tokio runtime for batched dispatch; flushing immediately");
                self.flush();
            }
        }
    }

    /// Commit everything buffered so far. Returns how many actions were applied.
    ///
    /// A timer armed for the flushed batch no longer fires.
    pub fn flush(&self) -> usize {
        self.flush_generation(None)
    }

    fn flush_generation(&self, armed: Option<u64>) -> usize {
        let actions = {
            let mut pending = self.lock();
            if armed.is_some_and(|generation| generation != pending.generation) {
                return 0;
            }
            pending.generation += 1;
            mem::take(&mut pending.actions)
        };
        let count = actions.len();
        if count > 0 {
            tracing::debug!("Flushing {count} batched actions");
            self.commit(actions);
        }
        count
    }

    fn commit(&self, actions: Vec<Action>) {
        let transition = self.store.commit_all(actions.clone());
        if let Some(hook) = &self.after_flush {
            hook(&actions, &transition);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
