//! The store registry: one global state tree composed of slices.

mod app;
mod slice;
mod subscription;

pub use app::{AppStore, SYSTEM_PATH};
pub use slice::SliceStore;
pub use subscription::{StateListener, Subscription};

use crate::activity::ActivityListener;
use crate::config::Config;
use crate::error::StoreResult;
use crate::operators::Update;
use crate::path::Path;
use crate::stats::StoreStats;
use crate::transaction::{Transaction, TransactionScope};
use crate::types::{ActivityId, ListenerId, TransactionId};
use crate::value::{Node, Value};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use subscription::{Listeners, Unsubscribe};
use tracing::{trace, warn};

/// Shared state behind an [`AppStore`] handle.
pub(crate) struct StoreInner {
    pub(crate) config: Config,
    /// Authoritative state; replaced wholesale on commit.
    state: RwLock<Node>,
    /// Registered slices, in registration order.
    slices: RwLock<Vec<SliceStore>>,
    initialized: AtomicBool,
    subscribers: Listeners<StateListener<Node>>,
    pub(crate) activity_listeners: Listeners<dyn ActivityListener>,
    next_transaction_id: AtomicU64,
    next_activity_id: AtomicU64,
    /// Serializes commits.
    pub(crate) commit_lock: Mutex<()>,
    pub(crate) stats: StoreStats,
}

impl StoreInner {
    fn new(config: Config) -> Self {
        Self {
            config,
            state: RwLock::new(Node::empty()),
            slices: RwLock::new(Vec::new()),
            initialized: AtomicBool::new(false),
            subscribers: Listeners::new(),
            activity_listeners: Listeners::new(),
            next_transaction_id: AtomicU64::new(1),
            next_activity_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
            stats: StoreStats::new(),
        }
    }

    /// Returns the authoritative state.
    pub(crate) fn latest(&self) -> Node {
        self.state.read().clone()
    }

    /// Returns the state as seen from the current call chain: the ambient
    /// transaction's working snapshot, or the authoritative state.
    pub(crate) fn view(self: &Arc<Self>) -> Node {
        TransactionScope::current_for(self)
            .map(|scope| scope.current_state())
            .unwrap_or_else(|| self.latest())
    }

    /// Replaces the authoritative state and returns the previous one.
    pub(crate) fn publish(&self, state: Node) -> Node {
        std::mem::replace(&mut *self.state.write(), state)
    }

    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.next_transaction_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_activity_id(&self) -> ActivityId {
        ActivityId::new(self.next_activity_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Runs every slice's reactions in registration order.
    pub(crate) fn run_reactions(&self) -> StoreResult<()> {
        let slices = self.slices.read().clone();
        for slice in &slices {
            slice.run_reactions()?;
        }
        Ok(())
    }

    /// Mirrors the id counters into the system slice of `txn`, if present.
    pub(crate) fn stamp_system(&self, txn: &mut Transaction) -> StoreResult<()> {
        if txn.current().get(SYSTEM_PATH).and_then(Value::as_node).is_none() {
            return Ok(());
        }
        let counters = Update::new()
            .set(
                "next_transaction_id",
                self.next_transaction_id.load(Ordering::Relaxed) as i64,
            )
            .set(
                "next_activity_id",
                self.next_activity_id.load(Ordering::Relaxed) as i64,
            );
        txn.update(&Path::root().child(SYSTEM_PATH), &counters)
    }

    /// Calls every state subscriber. A panicking subscriber is logged and skipped.
    pub(crate) fn notify(&self, new: &Node, old: &Node) {
        let subscribers = self.subscribers.snapshot();
        trace!(count = subscribers.len(), "notify");
        for subscriber in subscribers {
            self.stats.record_notification();
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| subscriber(new, old)));
            if delivered.is_err() {
                warn!("state subscriber panicked");
            }
        }
    }
}

impl Unsubscribe for StoreInner {
    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.subscribers.remove(id)
    }
}
