//! Listener registries and subscription handles.

use crate::types::ListenerId;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback receiving `(new, old)` after a committed change.
pub type StateListener<S> = dyn Fn(&S, &S) + Send + Sync;

/// An ordered, thread-safe list of listeners.
///
/// Listeners are invoked from a snapshot, so a listener may subscribe or
/// unsubscribe while being notified.
pub(crate) struct Listeners<F: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Arc<F>)>>,
}

impl<F: ?Sized> Listeners<F> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, listener: Arc<F>) -> ListenerId {
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl<F: ?Sized> Default for Listeners<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Something a [`Subscription`] can detach from.
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

/// Handle of a registered state listener.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: ListenerId,
    target: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, target: Weak<dyn Unsubscribe>) -> Self {
        Self { id, target }
    }

    /// Returns the listener ID.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.unsubscribe(self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Callback = dyn Fn() -> u32 + Send + Sync;

    #[test]
    fn add_and_remove_preserve_order() {
        let listeners: Listeners<Callback> = Listeners::new();
        let a = listeners.add(Arc::new(|| 1));
        let _b = listeners.add(Arc::new(|| 2));
        let _c = listeners.add(Arc::new(|| 3));

        assert!(listeners.remove(a));
        assert!(!listeners.remove(a));

        let values: Vec<u32> = listeners.snapshot().iter().map(|f| f()).collect();
        assert_eq!(values, [2, 3]);
        assert_eq!(listeners.len(), 2);
    }

    struct Registry(Listeners<Callback>);

    impl Unsubscribe for Registry {
        fn unsubscribe(&self, id: ListenerId) -> bool {
            self.0.remove(id)
        }
    }

    #[test]
    fn subscription_detaches_once() {
        let registry = Arc::new(Registry(Listeners::new()));
        let id = registry.0.add(Arc::new(|| 0));
        let target: Weak<dyn Unsubscribe> = Arc::downgrade(&registry) as Weak<dyn Unsubscribe>;

        let subscription = Subscription::new(id, target.clone());
        assert!(subscription.unsubscribe());
        assert_eq!(registry.0.len(), 0);

        let again = Subscription::new(id, target);
        assert!(!again.unsubscribe());
    }

    #[test]
    fn subscription_outliving_target() {
        let registry = Arc::new(Registry(Listeners::new()));
        let id = registry.0.add(Arc::new(|| 0));
        let target: Weak<dyn Unsubscribe> = Arc::downgrade(&registry) as Weak<dyn Unsubscribe>;
        drop(registry);

        assert!(!Subscription::new(id, target).unsubscribe());
    }
}
