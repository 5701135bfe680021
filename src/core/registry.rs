//! # Subscriber registry.
//!
//! Per-process ordered list of subscribers, each identified by a
//! [`SubscriberId`]. Handles are assigned monotonically and never reused.
//!
//! The list is copy-on-write: a cycle takes a [`Snapshot`] at start and
//! iterates it, so registering or unregistering mid-cycle only affects the
//! next cycle.
//!
//! ```text
//! register(A) → sub#1   register(B) → sub#2
//! snapshot() = [sub#1 A, sub#2 B]   ← cycle X iterates this
//! unregister(sub#2)                 ← during X
//! snapshot() = [sub#1 A]            ← cycle Y
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::subscribers::Subscriber;

/// Registration handle of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Raw numeric value (unique per process).
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

#[derive(Clone)]
pub(crate) struct Entry {
    pub id: SubscriberId,
    pub subscriber: Arc<dyn Subscriber>,
}

pub(crate) type Snapshot = Arc<Vec<Entry>>;

pub(crate) struct Registry {
    entries: RwLock<Snapshot>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a subscriber and returns its handle.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut *guard).push(Entry { id, subscriber });
        id
    }

    /// Removes a subscriber. Returns false if the handle is unknown.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = guard.iter().position(|e| e.id == id) else {
            return false;
        };
        Arc::make_mut(&mut *guard).remove(pos);
        true
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.snapshot().iter().any(|e| e.id == id)
    }

    /// Current subscribers in registration order.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.entries.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscribers::{Completion, SubscriberFn};

    fn noop(name: &'static str) -> Arc<dyn Subscriber> {
        SubscriberFn::arc(name, |_, _| Ok(Completion::Done))
    }

    #[test]
    fn handles_are_monotonic_and_never_reused() {
        let reg = Registry::new();
        let a = reg.register(noop("a"));
        let b = reg.register(noop("b"));
        assert!(reg.unregister(b));
        let c = reg.register(noop("c"));

        assert!(a < b && b < c);
        assert_ne!(b, c);
        assert!(!reg.contains(b));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let reg = Registry::new();
        let a = reg.register(noop("a"));
        let b = reg.register(noop("b"));

        let snap = reg.snapshot();
        reg.unregister(b);

        let ids: Vec<_> = snap.iter().map(|e| e.id).collect();
        assert_eq!(ids, [a, b]);
        assert_eq!(reg.snapshot().len(), 1);
    }

    #[test]
    fn unknown_handle_is_ignored() {
        let reg = Registry::new();
        assert!(!reg.unregister(SubscriberId(99)));
    }
}
