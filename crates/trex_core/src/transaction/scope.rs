//! Ambient transaction scope.

use super::state::{Transaction, TransactionState};
use crate::activity::ActivityScope;
use crate::error::{StoreError, StoreResult};
use crate::operators::Update;
use crate::path::Path;
use crate::store::StoreInner;
use crate::types::TransactionId;
use crate::value::Node;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace, warn};

tokio::task_local! {
    static CURRENT_TRANSACTION: Option<Arc<TransactionScope>>;
}

/// A root transaction bound to a store.
///
/// Code running inside [`AppStore::transaction`](crate::AppStore::transaction)
/// (or its async variant) sees the scope through
/// [`TransactionScope::current`]; nested transaction calls join it.
pub struct TransactionScope {
    id: TransactionId,
    store: Arc<StoreInner>,
    txn: Mutex<Transaction>,
}

impl TransactionScope {
    pub(crate) fn begin(store: &Arc<StoreInner>) -> Arc<Self> {
        let id = store.next_transaction_id();
        store.stats.record_transaction_start();
        debug!(id = %id, "transaction begin");
        Arc::new(Self {
            id,
            store: Arc::clone(store),
            txn: Mutex::new(Transaction::new(id, store.latest())),
        })
    }

    /// Returns the transaction active on the current call chain, if any.
    pub fn current() -> Option<Arc<Self>> {
        CURRENT_TRANSACTION.try_with(Clone::clone).ok().flatten()
    }

    /// Returns the ambient transaction if it belongs to `store`.
    pub(crate) fn current_for(store: &Arc<StoreInner>) -> Option<Arc<Self>> {
        Self::current().filter(|scope| Arc::ptr_eq(&scope.store, store))
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the transaction state.
    pub fn state(&self) -> TransactionState {
        self.txn.lock().state()
    }

    /// Returns the working snapshot, with this transaction's pending writes.
    pub fn current_state(&self) -> Node {
        self.txn.lock().current().clone()
    }

    /// Returns the snapshot the transaction started from.
    pub fn base_state(&self) -> Node {
        self.txn.lock().base().clone()
    }

    /// Applies `update` to the map at `path`.
    pub fn update(&self, path: &Path, update: &Update) -> StoreResult<()> {
        self.txn.lock().update(path, update)
    }

    /// Integrates the working snapshot into the store.
    ///
    /// Rebases when another transaction committed first, runs reactions,
    /// publishes, and then notifies subscribers with no ambient transaction.
    pub(crate) fn commit(self: &Arc<Self>) -> StoreResult<()> {
        let store = &self.store;
        let (new_state, old_state) = {
            let _guard = store.commit_lock.lock();
            let latest = store.latest();

            {
                let mut txn = self.txn.lock();
                txn.ensure_active()?;

                if !txn.has_changes() || Node::ptr_eq(txn.current(), &latest) {
                    txn.mark_committed();
                    store.stats.record_transaction_empty();
                    debug!(id = %self.id, updates = txn.update_count(), "nothing to commit");
                    return Ok(());
                }

                if !Node::ptr_eq(txn.base(), &latest) {
                    store.stats.record_rebase();
                    if let Err(err) = txn.rebase(&latest, store.config.conflict_policy) {
                        txn.mark_aborted();
                        store.stats.record_transaction_abort();
                        if err.is_conflict() {
                            store.stats.record_conflict();
                        }
                        warn!(id = %self.id, error = %err, "commit aborted");
                        return Err(err);
                    }
                }
            }

            let reactions =
                CURRENT_TRANSACTION.sync_scope(Some(Arc::clone(self)), || store.run_reactions());
            if let Err(err) = reactions {
                warn!(id = %self.id, error = %err, "reaction failed");
                self.abort();
                return Err(err);
            }

            let mut txn = self.txn.lock();
            if let Err(err) = store.stamp_system(&mut txn) {
                drop(txn);
                warn!(id = %self.id, error = %err, "system slice update failed");
                self.abort();
                return Err(err);
            }
            let new_state = txn.current().clone();
            let old_state = store.publish(new_state.clone());
            txn.mark_committed();
            txn.commit_tree();
            (new_state, old_state)
        };

        store.stats.record_transaction_commit();
        if let Some(activity) = ActivityScope::current_for(store) {
            activity.record_transaction();
        }
        debug!(id = %self.id, version = new_state.version(), "transaction committed");

        CURRENT_TRANSACTION.sync_scope(None, || store.notify(&new_state, &old_state));
        Ok(())
    }

    /// Marks an active transaction aborted. Nothing was published for it.
    pub(crate) fn abort(&self) {
        let mut txn = self.txn.lock();
        if txn.is_active() {
            txn.mark_aborted();
            self.store.stats.record_transaction_abort();
            debug!(id = %self.id, "transaction aborted");
        }
    }
}

impl fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Runs `action` inside a transaction on `store`, joining an ambient one.
pub(crate) fn run_sync<T, E, F>(store: &Arc<StoreInner>, action: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<StoreError>,
{
    if let Some(scope) = TransactionScope::current_for(store) {
        trace!(id = %scope.id(), "joining ambient transaction");
        return action();
    }

    let scope = TransactionScope::begin(store);
    match CURRENT_TRANSACTION.sync_scope(Some(Arc::clone(&scope)), action) {
        Ok(value) => {
            scope.commit()?;
            Ok(value)
        }
        Err(err) => {
            scope.abort();
            Err(err)
        }
    }
}

/// Async form of [`run_sync`]; commits once the future resolves.
pub(crate) async fn run_async<T, E, F, Fut>(store: &Arc<StoreInner>, action: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<StoreError>,
{
    if let Some(scope) = TransactionScope::current_for(store) {
        trace!(id = %scope.id(), "joining ambient transaction");
        return action().await;
    }

    let scope = TransactionScope::begin(store);
    let result = CURRENT_TRANSACTION
        .scope(Some(Arc::clone(&scope)), async move { action().await })
        .await;
    match result {
        Ok(value) => {
            scope.commit()?;
            Ok(value)
        }
        Err(err) => {
            scope.abort();
            Err(err)
        }
    }
}
