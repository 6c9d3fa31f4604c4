//! The application store.

use super::slice::SliceStore;
use super::subscription::{StateListener, Subscription, Unsubscribe};
use super::StoreInner;
use crate::activity::{self, ActivityListener};
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::fields;
use crate::operators::Update;
use crate::path::Path;
use crate::stats::StatsSnapshot;
use crate::transaction;
use crate::types::ListenerId;
use crate::value::{Node, Value};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Path of the reserved system slice registered by [`AppStore::init`].
pub const SYSTEM_PATH: &str = "$$system";

/// Owner of the global state tree.
///
/// Slices are registered at non-overlapping paths, then the store is
/// initialized. `AppStore` is a cheap handle; clones share the same store.
///
/// # Example
///
/// ```
/// use trex_core::{fields, inc, AppStore, SliceStore, StoreResult, Update};
///
/// let store = AppStore::new();
/// let counter = SliceStore::new("counter", fields! { "value" => 0 }).unwrap();
/// store.init(&[counter.clone()]).unwrap();
///
/// store
///     .transaction(|| -> StoreResult<()> {
///         counter.update(Update::new().set("value", inc()))?;
///         Ok(())
///     })
///     .unwrap();
/// assert_eq!(counter.get("value").unwrap().as_i64(), Some(1));
/// ```
#[derive(Clone)]
pub struct AppStore {
    inner: Arc<StoreInner>,
}

impl AppStore {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an empty store.
    pub fn with_config(config: Config) -> Self {
        Self {
            inner: Arc::new(StoreInner::new(config)),
        }
    }

    /// Creates a store owning only `slice`, already initialized.
    pub fn standalone(slice: &SliceStore) -> StoreResult<Self> {
        let store = Self::new();
        store.init(std::slice::from_ref(slice))?;
        Ok(store)
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<StoreInner> {
        &self.inner
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Registers `slice` and splices its initial state into the tree.
    ///
    /// Fails if the store is initialized, if the slice path overlaps a
    /// registered one, or if the slice belongs to another store.
    pub fn register(&self, slice: &SliceStore) -> StoreResult<()> {
        self.register_slice(slice, false)
    }

    /// The system slice may nest inside a root slice.
    fn register_slice(&self, slice: &SliceStore, system: bool) -> StoreResult<()> {
        let inner = &self.inner;
        if inner.is_initialized() {
            return Err(StoreError::AlreadyInitialized);
        }

        let mut slices = inner.slices.write();
        let conflict = slices
            .iter()
            .filter(|s| !(system && s.path().is_root()))
            .find(|s| s.path().overlaps(slice.path()));
        if let Some(existing) = conflict {
            return Err(StoreError::path_conflict(slice.path(), existing.path()));
        }

        let mut state = inner.state.write();
        let next = slice
            .path()
            .assign(&state, Value::Map(slice.initial_state().clone()))?;
        slice.bind(inner)?;
        *state = next;
        drop(state);

        slices.push(slice.clone());
        drop(slices);

        let emitter = slice.clone();
        let listener: Arc<StateListener<Node>> =
            Arc::new(move |new: &Node, old: &Node| emitter.emit(new, old));
        inner.subscribers.add(listener);

        debug!(path = %slice.path(), "slice registered");
        Ok(())
    }

    /// Registers `slices` and the system slice, then marks the store
    /// initialized through a regular transaction.
    pub fn init(&self, slices: &[SliceStore]) -> StoreResult<()> {
        debug!(count = slices.len(), "init");
        for slice in slices {
            self.register(slice)?;
        }

        let system = SliceStore::new(
            SYSTEM_PATH,
            fields! {
                "initialized" => false,
                "next_transaction_id" => self.inner.next_transaction_id.load(Ordering::Relaxed) as i64,
                "next_activity_id" => self.inner.next_activity_id.load(Ordering::Relaxed) as i64,
            },
        )?;
        self.register_slice(&system, true)?;

        self.transaction(|| -> StoreResult<()> {
            system.update(Update::new().set("initialized", true))?;
            Ok(())
        })?;
        self.inner.initialized.store(true, Ordering::SeqCst);

        info!(slices = slices.len(), "store initialized");
        Ok(())
    }

    /// Returns true once [`AppStore::init`] has completed.
    pub fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    /// Returns the paths of the registered slices, in registration order.
    pub fn slice_paths(&self) -> Vec<Path> {
        self.inner
            .slices
            .read()
            .iter()
            .map(|slice| slice.path().clone())
            .collect()
    }

    /// Returns the global state.
    ///
    /// Inside a transaction on this store, this is the transaction's working
    /// snapshot; elsewhere it is the last committed state.
    pub fn state(&self) -> Node {
        self.inner.view()
    }

    /// Returns the last committed state, ignoring any ambient transaction.
    pub fn committed_state(&self) -> Node {
        self.inner.latest()
    }

    /// Returns the system slice, if the store is initialized.
    pub fn system_state(&self) -> Option<Node> {
        self.inner
            .latest()
            .get(SYSTEM_PATH)
            .and_then(Value::as_node)
            .cloned()
    }

    /// Subscribes to committed changes of the global state.
    ///
    /// The listener receives `(new, old)` after every commit that published
    /// a new state, outside of any transaction.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Node, &Node) + Send + Sync + 'static,
    {
        let id = self.inner.subscribers.add(Arc::new(listener));
        let target: Weak<dyn Unsubscribe> = Arc::downgrade(&self.inner) as Weak<dyn Unsubscribe>;
        Subscription::new(id, target)
    }

    /// Registers an activity listener.
    pub fn register_listener(&self, listener: Arc<dyn ActivityListener>) -> ListenerId {
        self.inner.activity_listeners.add(listener)
    }

    /// Unregisters an activity listener. Returns false if it was not registered.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.inner.activity_listeners.remove(id)
    }

    /// Runs `action` inside a transaction. See
    /// [`run_inside_transaction`](crate::run_inside_transaction).
    pub fn transaction<T, E, F>(&self, action: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<StoreError>,
    {
        transaction::run_sync(&self.inner, action)
    }

    /// Runs the future produced by `action` inside a transaction.
    pub async fn transaction_async<T, E, F, Fut>(&self, action: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StoreError>,
    {
        transaction::run_async(&self.inner, action).await
    }

    /// Runs `action` as an activity named `name`.
    pub fn activity<T, E, F>(&self, name: &str, action: F) -> Result<T, E>
    where
        T: Any,
        F: FnOnce() -> Result<T, E>,
        E: From<StoreError> + fmt::Display,
    {
        activity::run_sync(&self.inner, name, action)
    }

    /// Runs the future produced by `action` as an activity named `name`.
    pub async fn activity_async<T, E, F, Fut>(&self, name: &str, action: F) -> Result<T, E>
    where
        T: Any,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StoreError> + fmt::Display,
    {
        activity::run_async(&self.inner, name, action).await
    }

    /// Returns a snapshot of the store counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AppStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppStore")
            .field("slices", &self.slice_paths())
            .field("initialized", &self.is_initialized())
            .field("subscribers", &self.inner.subscribers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::inc;

    fn create_slice(path: &str) -> SliceStore {
        SliceStore::new(path, fields! { "value" => 0 }).unwrap()
    }

    #[test]
    fn init_registers_system_slice() {
        let store = AppStore::new();
        store.init(&[create_slice("a")]).unwrap();

        let system = store.system_state().unwrap();
        assert_eq!(system.get("initialized"), Some(&Value::from(true)));
        assert!(store.is_initialized());
        assert_eq!(
            store.slice_paths(),
            [Path::parse("a").unwrap(), Path::parse(SYSTEM_PATH).unwrap()]
        );
        assert_eq!(store.stats().transactions_committed, 1);
    }

    #[test]
    fn register_after_init_fails() {
        let store = AppStore::new();
        store.init(&[]).unwrap();
        let err = store.register(&create_slice("late")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyInitialized));
    }

    #[test]
    fn overlapping_paths_are_rejected() {
        let store = AppStore::new();
        store.register(&create_slice("a")).unwrap();
        store.register(&create_slice("b")).unwrap();

        let err = store.register(&create_slice("a.b")).unwrap_err();
        assert!(matches!(err, StoreError::PathConflict { .. }));
        assert!(err.is_configuration());
        assert!(store.register(&create_slice("ab")).is_ok());
    }

    #[test]
    fn root_slice_conflicts_with_everything() {
        let store = AppStore::new();
        store.register(&create_slice("/")).unwrap();
        assert!(store.register(&create_slice("/")).is_err());
        assert!(store.register(&create_slice("x")).is_err());
    }

    #[test]
    fn root_slice_initializes_with_system_slice_inside() {
        let root = create_slice("/");
        let store = AppStore::standalone(&root).unwrap();
        assert!(store.is_initialized());

        root.update(Update::new().set("value", inc())).unwrap();
        assert_eq!(root.get("value").unwrap(), Value::from(1));
        assert!(store.state().contains(SYSTEM_PATH));
        assert_eq!(
            store.system_state().unwrap().get("initialized"),
            Some(&Value::from(true))
        );
    }

    #[test]
    fn system_slice_tracks_id_counters() {
        let store = AppStore::new();
        let slice = create_slice("a");
        store.init(&[slice.clone()]).unwrap();
        let counter = |field: &str| {
            store
                .system_state()
                .and_then(|system| system.get(field).and_then(Value::as_i64))
                .unwrap()
        };
        let before = counter("next_transaction_id");

        store
            .activity("bump", || slice.set("value", 1).map(drop))
            .unwrap();
        assert_eq!(counter("next_transaction_id"), before + 1);
        assert_eq!(counter("next_activity_id"), 2);
    }

    #[test]
    fn slice_belongs_to_one_store() {
        let slice = create_slice("a");
        AppStore::new().register(&slice).unwrap();
        let err = AppStore::new().register(&slice).unwrap_err();
        assert!(matches!(err, StoreError::SliceAlreadyRegistered { .. }));
    }

    #[test]
    fn registration_splices_nested_paths() {
        let store = AppStore::new();
        store.register(&create_slice("ui.sidebar")).unwrap();
        store.register(&create_slice("ui.header")).unwrap();

        let ui = store.state().get("ui").and_then(Value::as_node).cloned().unwrap();
        assert!(ui.contains("sidebar"));
        assert!(ui.contains("header"));
    }

    #[test]
    fn subscribers_see_new_and_old_state() {
        let store = AppStore::new();
        let slice = create_slice("a");
        store.init(&[slice.clone()]).unwrap();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = store.subscribe(move |new, old| {
            sink.lock().push((new.clone(), old.clone()));
        });

        let before = store.state();
        slice.update(Update::new().set("value", inc())).unwrap();
        assert_eq!(seen.lock().len(), 1);
        assert!(Node::ptr_eq(&seen.lock()[0].1, &before));
        assert!(Node::ptr_eq(&seen.lock()[0].0, &store.state()));

        assert!(subscription.unsubscribe());
        slice.update(Update::new().set("value", inc())).unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_break_commit() {
        let store = AppStore::new();
        let slice = create_slice("a");
        store.init(&[slice.clone()]).unwrap();
        store.subscribe(|_, _| panic!("boom"));

        slice.update(Update::new().set("value", 5)).unwrap();
        assert_eq!(slice.get("value").unwrap(), Value::from(5));
    }

    #[test]
    fn standalone_store_owns_its_slice() {
        let slice = create_slice("solo");
        let store = AppStore::standalone(&slice).unwrap();
        assert!(store.is_initialized());
        assert_eq!(slice.app_store().unwrap().slice_paths().len(), 2);
    }
}
