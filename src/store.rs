//! # Store: a state holder fed by dispatch cycles.
//!
//! [`Store`] keeps one value `S` and a reducer `Fn(&mut S, &Action) -> bool`.
//! Attached to a [`Dispatcher`], it runs the reducer for every action it
//! sees; when the reducer reports a change, the version counter is bumped and
//! every [`changes`](Store::changes) receiver wakes up.
//!
//! ```text
//!  dispatch(a) ──► cycle ──► Store::handle(a)
//!                                 │ reducer(&mut S, a) == true
//!                                 ▼
//!                          version += 1 ──► watch::Receiver<u64> (views re-read state())
//! ```
//!
//! Other subscribers of the same cycle can order themselves after the store
//! with `cx.wait_for(&[store_id])`.
//!
//! ## Example
//! ```rust
//! use relaybus::{Action, BusConfig, Dispatcher, Store};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let dispatcher = Dispatcher::new(&BusConfig::default());
//!     let tabs = Store::new(0u32, |count: &mut u32, a: &Action| {
//!         if a.action_type() == "tab-opened" {
//!             *count += 1;
//!             return true;
//!         }
//!         false
//!     });
//!     tabs.attach(&dispatcher);
//!
//!     dispatcher.dispatch(Action::new("tab-opened")).unwrap();
//!     dispatcher.settled().await;
//!     assert_eq!(tabs.state(), 1);
//!     assert_eq!(tabs.version(), 1);
//! }
//! ```

use std::borrow::Cow;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use crate::action::Action;
use crate::core::{CycleContext, Dispatcher, SubscriberId};
use crate::error::SubscriberError;
use crate::subscribers::{Completion, Subscriber};

type Reducer<S> = dyn Fn(&mut S, &Action) -> bool + Send + Sync;

/// Shared handle to a reducer-driven state value. Cheap to clone.
pub struct Store<S> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    name: Cow<'static, str>,
    state: RwLock<S>,
    reducer: Box<Reducer<S>>,
    version: watch::Sender<u64>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Send + Sync + 'static> Store<S> {
    pub fn new<F>(initial: S, reducer: F) -> Self
    where
        F: Fn(&mut S, &Action) -> bool + Send + Sync + 'static,
    {
        Self::named("store", initial, reducer)
    }

    /// Like [`new`](Self::new), with the name used in logs and events.
    pub fn named<F>(name: impl Into<Cow<'static, str>>, initial: S, reducer: F) -> Self
    where
        F: Fn(&mut S, &Action) -> bool + Send + Sync + 'static,
    {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: RwLock::new(initial),
                reducer: Box::new(reducer),
                version,
            }),
        }
    }

    /// Registers the store on `dispatcher`. The handle can be used in
    /// `wait_for` by other subscribers.
    pub fn attach(&self, dispatcher: &Dispatcher) -> SubscriberId {
        dispatcher.register(Arc::new(self.clone()))
    }

    /// Runs the reducer outside a cycle. Returns true if the state changed.
    pub fn apply(&self, action: &Action) -> bool {
        let changed = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            (self.inner.reducer)(&mut state, action)
        };
        if changed {
            self.inner.version.send_modify(|v| *v += 1);
            tracing::trace!(store = %self.inner.name, action = action.action_type(), "store changed");
        }
        changed
    }

    /// Reads the state without cloning it.
    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Number of changes applied so far.
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// Receiver notified after every change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl<S: Clone + Send + Sync + 'static> Store<S> {
    /// Snapshot of the current state.
    pub fn state(&self) -> S {
        self.with_state(S::clone)
    }
}

impl<S: Send + Sync + 'static> Subscriber for Store<S> {
    fn handle(&self, action: &Action, _cx: &CycleContext) -> Result<Completion, SubscriberError> {
        self.apply(action);
        Ok(Completion::Done)
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::action::Value;
    use crate::core::BusConfig;
    use crate::subscribers::SubscriberFn;

    fn titles() -> Store<Vec<String>> {
        Store::named("titles", Vec::new(), |titles: &mut Vec<String>, a: &Action| {
            if a.action_type() != "set-title" {
                return false;
            }
            match a.field("title").and_then(Value::as_str) {
                Some(title) => {
                    titles.push(title.to_string());
                    true
                }
                None => false,
            }
        })
    }

    #[tokio::test]
    async fn reducer_changes_bump_the_version() {
        let dispatcher = Dispatcher::new(&BusConfig::default());
        let store = titles();
        let mut changes = store.changes();
        store.attach(&dispatcher);

        dispatcher
            .dispatch(Action::new("set-title").with_field("title", "inbox"))
            .unwrap();
        dispatcher.dispatch(Action::new("ignored")).unwrap();
        dispatcher.settled().await;

        assert_eq!(store.state(), vec!["inbox".to_string()]);
        assert_eq!(store.version(), 1);
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 1);
    }

    #[tokio::test]
    async fn later_subscribers_can_wait_for_the_store() {
        let dispatcher = Dispatcher::new(&BusConfig::default());
        let store = titles();
        let seen = Arc::new(Mutex::new(Vec::new()));

        // Registered first so it has to wait for the store explicitly.
        let view_store = store.clone();
        let view_seen = Arc::clone(&seen);
        let store_id = Arc::new(Mutex::new(None::<SubscriberId>));
        let view_id = Arc::clone(&store_id);
        dispatcher.register(SubscriberFn::arc("view", move |_a: &Action, cx| {
            let cx = cx.clone();
            let store = view_store.clone();
            let seen = Arc::clone(&view_seen);
            let Some(id) = *view_id.lock().unwrap() else {
                return Ok(Completion::Done);
            };
            Ok(Completion::pending(async move {
                cx.wait_for(&[id]).await?;
                seen.lock().unwrap().push(store.state().len());
                Ok(())
            }))
        }));
        *store_id.lock().unwrap() = Some(store.attach(&dispatcher));

        dispatcher
            .dispatch(Action::new("set-title").with_field("title", "a"))
            .unwrap();
        dispatcher.settled().await;

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn apply_outside_a_cycle() {
        let store = titles();
        assert!(!store.apply(&Action::new("set-title")));
        assert!(store.apply(&Action::new("set-title").with_field("title", "x")));
        assert_eq!(store.with_state(Vec::len), 1);
        assert_eq!(store.name(), "titles");
    }
}
