//! Slice stores: independently owned parts of the global state.

use super::app::AppStore;
use super::subscription::{Listeners, StateListener, Subscription, Unsubscribe};
use super::StoreInner;
use crate::error::{StoreError, StoreResult};
use crate::operators::{Change, Update};
use crate::path::Path;
use crate::transaction::{self, TransactionScope};
use crate::types::ListenerId;
use crate::value::{Node, Value, NULL};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{trace, warn};

/// Derived computation re-run after every commit.
type Reaction = dyn Fn(&SliceStore) -> StoreResult<()> + Send + Sync;

struct SliceInner {
    path: Path,
    initial: Node,
    store: OnceLock<Weak<StoreInner>>,
    reactions: RwLock<Vec<Arc<Reaction>>>,
    listeners: Listeners<StateListener<Node>>,
}

/// A component's view of its own part of the global state.
///
/// A slice is created with a path and an initial map, then registered with
/// an [`AppStore`]. Reads see the ambient transaction's working snapshot;
/// writes go through a transaction.
#[derive(Clone)]
pub struct SliceStore {
    inner: Arc<SliceInner>,
}

impl SliceStore {
    /// Creates a slice at `path` (dot-separated, `"/"` for the root).
    ///
    /// The initial state must be a map.
    pub fn new(path: &str, initial: impl Into<Value>) -> StoreResult<Self> {
        let path = Path::parse(path)?;
        let initial = match initial.into() {
            Value::Map(node) => node,
            other => return Err(StoreError::invalid_slice_state(&path, &other)),
        };
        Ok(Self {
            inner: Arc::new(SliceInner {
                path,
                initial,
                store: OnceLock::new(),
                reactions: RwLock::new(Vec::new()),
                listeners: Listeners::new(),
            }),
        })
    }

    /// Creates a slice whose initial state is `state` converted through serde.
    pub fn from_serialize<T: Serialize + ?Sized>(path: &str, state: &T) -> StoreResult<Self> {
        Self::new(path, Value::from_serialize(state)?)
    }

    /// Returns the slice path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub(crate) fn initial_state(&self) -> &Node {
        &self.inner.initial
    }

    pub(crate) fn bind(&self, store: &Arc<StoreInner>) -> StoreResult<()> {
        self.inner
            .store
            .set(Arc::downgrade(store))
            .map_err(|_| StoreError::SliceAlreadyRegistered {
                path: self.inner.path.to_string(),
            })
    }

    fn store(&self) -> StoreResult<Arc<StoreInner>> {
        self.inner
            .store
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| StoreError::not_initialized(&self.inner.path))
    }

    /// Returns the store this slice is registered with.
    pub fn app_store(&self) -> StoreResult<AppStore> {
        self.store().map(AppStore::from_inner)
    }

    /// Adds a reaction.
    ///
    /// Reactions run after every commit that changed the state, inside the
    /// committing transaction, in slice registration order. A reaction should
    /// only write to its own slice; an error aborts the commit.
    pub fn add_reaction<F>(&self, reaction: F)
    where
        F: Fn(&SliceStore) -> StoreResult<()> + Send + Sync + 'static,
    {
        self.inner.reactions.write().push(Arc::new(reaction));
    }

    pub(crate) fn run_reactions(&self) -> StoreResult<()> {
        let reactions = self.inner.reactions.read().clone();
        if !reactions.is_empty() {
            trace!(path = %self.inner.path, count = reactions.len(), "reactions");
        }
        for reaction in reactions {
            reaction(self)?;
        }
        Ok(())
    }

    /// Returns the slice state as seen from the current call chain.
    pub fn state(&self) -> StoreResult<Node> {
        let store = self.store()?;
        self.resolve(&store.view())
    }

    /// Returns the slice state converted through serde.
    pub fn state_as<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Value::Map(self.state()?).deserialize()
    }

    /// Returns one field of the slice state, `Null` when absent.
    pub fn get(&self, field: &str) -> StoreResult<Value> {
        Ok(self.state()?.get(field).cloned().unwrap_or_default())
    }

    /// Applies `update` and returns the new slice state.
    ///
    /// Joins the ambient transaction. Without one, a transaction is started
    /// when `update_auto_begin_transaction` is set; otherwise this fails with
    /// [`StoreError::NoAmbientTransaction`].
    pub fn update(&self, update: impl Into<Update>) -> StoreResult<Node> {
        let update = update.into();
        self.write(|_| Ok(update))
    }

    /// Computes an update from the current slice state and applies it.
    pub fn update_with<F>(&self, f: F) -> StoreResult<Node>
    where
        F: FnOnce(&Node) -> Update,
    {
        self.write(|state| Ok(f(state)))
    }

    /// Sets one field and returns its new value.
    pub fn set(&self, field: &str, change: impl Into<Change>) -> StoreResult<Value> {
        let state = self.update(Update::new().set(field, change))?;
        Ok(state.get(field).cloned().unwrap_or_default())
    }

    fn write<F>(&self, build: F) -> StoreResult<Node>
    where
        F: FnOnce(&Node) -> StoreResult<Update>,
    {
        let store = self.store()?;
        if let Some(scope) = TransactionScope::current_for(&store) {
            let update = build(&self.resolve(&scope.current_state())?)?;
            scope.update(&self.inner.path, &update)?;
            return self.resolve(&scope.current_state());
        }

        if !store.config.update_auto_begin_transaction {
            return Err(StoreError::no_ambient_transaction(&self.inner.path));
        }
        transaction::run_sync(&store, || self.write(build))?;
        self.resolve(&store.latest())
    }

    fn resolve(&self, root: &Node) -> StoreResult<Node> {
        let root = Value::Map(root.clone());
        match self.inner.path.resolve(&root)? {
            Some(Value::Map(node)) => Ok(node.clone()),
            Some(other) => Err(StoreError::invalid_slice_state(&self.inner.path, other)),
            None => Err(StoreError::not_initialized(&self.inner.path)),
        }
    }

    /// Subscribes to committed changes of this slice.
    ///
    /// The listener is called immediately with the current state as both
    /// arguments, then with `(new, old)` after each commit that changed the
    /// slice.
    pub fn subscribe<F>(&self, listener: F) -> StoreResult<Subscription>
    where
        F: Fn(&Node, &Node) + Send + Sync + 'static,
    {
        let state = self.state()?;
        listener(&state, &state);
        Ok(self.listen(Arc::new(listener)))
    }

    /// Subscribes to one value inside this slice, addressed by a path
    /// relative to the slice. Missing values are reported as `Null`.
    pub fn subscribe_to<F>(&self, path: &str, listener: F) -> StoreResult<Subscription>
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let path = Path::parse(path)?;
        Ok(self.listen(Arc::new(move |new: &Node, old: &Node| {
            let new = Value::Map(new.clone());
            let old = Value::Map(old.clone());
            let next = path.resolve(&new).ok().flatten().unwrap_or(&NULL);
            let prev = path.resolve(&old).ok().flatten().unwrap_or(&NULL);
            if !next.same(prev) {
                listener(next, prev);
            }
        })))
    }

    fn listen(&self, listener: Arc<StateListener<Node>>) -> Subscription {
        let id = self.inner.listeners.add(listener);
        let target: Weak<dyn Unsubscribe> = Arc::downgrade(&self.inner) as Weak<dyn Unsubscribe>;
        Subscription::new(id, target)
    }

    /// Forwards a global change to the slice listeners if the slice changed.
    pub(crate) fn emit(&self, new_root: &Node, old_root: &Node) {
        let (Ok(new), Ok(old)) = (self.resolve(new_root), self.resolve(old_root)) else {
            return;
        };
        if Node::ptr_eq(&new, &old) {
            return;
        }
        for listener in self.inner.listeners.snapshot() {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener(&new, &old)));
            if delivered.is_err() {
                warn!(path = %self.inner.path, "slice subscriber panicked");
            }
        }
    }
}

impl Unsubscribe for SliceInner {
    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl fmt::Debug for SliceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceStore")
            .field("path", &self.inner.path)
            .field("registered", &self.inner.store.get().is_some())
            .finish_non_exhaustive()
    }
}
