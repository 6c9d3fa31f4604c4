//! Transaction state.

use crate::config::ConflictPolicy;
use crate::error::{Conflict, StoreError, StoreResult};
use crate::operators::{Change, Operator, Update};
use crate::path::Path;
use crate::tree::VersionedTree;
use crate::types::TransactionId;
use crate::value::{Node, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and accepts updates.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// How a field got its value in this transaction.
#[derive(Debug, Clone)]
enum FieldLog {
    /// Only operators were applied, in this order.
    Operators(Vec<Arc<dyn Operator>>),
    /// A plain value was written at least once.
    Written,
}

/// A transaction record: a working tree over the state it started from.
#[derive(Debug)]
pub struct Transaction {
    /// Transaction ID.
    id: TransactionId,
    /// Current state.
    state: TransactionState,
    /// Base and working snapshots.
    tree: VersionedTree,
    /// Field path -> how the field was written.
    log: BTreeMap<Path, FieldLog>,
    /// Number of updates applied.
    updates: usize,
}

impl Transaction {
    /// Creates a new transaction starting from `base`.
    pub(crate) fn new(id: TransactionId, base: Node) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            tree: VersionedTree::new(base),
            log: BTreeMap::new(),
            updates: 0,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns the snapshot the transaction started from (or was rebased onto).
    pub fn base(&self) -> &Node {
        self.tree.base()
    }

    /// Returns the working snapshot, including this transaction's writes.
    pub fn current(&self) -> &Node {
        self.tree.current()
    }

    /// Returns true if the working snapshot differs from the base.
    pub fn has_changes(&self) -> bool {
        self.tree.has_changes()
    }

    /// Returns the number of updates applied.
    pub fn update_count(&self) -> usize {
        self.updates
    }

    /// Applies `update` to the map at `path`.
    ///
    /// Operators are resolved against the field values this transaction
    /// currently sees.
    pub fn update(&mut self, path: &Path, update: &Update) -> StoreResult<()> {
        self.ensure_active()?;

        let fields = update.resolve(self.tree.node_at(path)?)?;
        self.tree.set_property(path, fields)?;
        self.updates += 1;

        for (field, change) in update.iter() {
            let key = path.child(field);
            match change {
                Change::Operator(op) => {
                    let log = self
                        .log
                        .entry(key)
                        .or_insert_with(|| FieldLog::Operators(Vec::new()));
                    if let FieldLog::Operators(ops) = log {
                        ops.push(Arc::clone(op));
                    }
                }
                Change::Value(_) => {
                    self.log.insert(key, FieldLog::Written);
                }
            }
        }

        trace!(id = %self.id, path = %path, fields = update.len(), "update");
        Ok(())
    }

    /// Rebases the working snapshot onto `latest`.
    ///
    /// A conflicting field whose value came only from operators is recomputed
    /// by replaying them on the committed value. Other conflicts follow
    /// `policy`.
    pub(crate) fn rebase(&mut self, latest: &Node, policy: ConflictPolicy) -> StoreResult<()> {
        self.ensure_active()?;
        let log = &self.log;
        self.tree.rebase_with(latest, |conflict| {
            if let Some(FieldLog::Operators(ops)) = log.get(&conflict.path) {
                return replay(ops, conflict);
            }
            conflict.converged().or_else(|| match policy {
                ConflictPolicy::Strict => None,
                ConflictPolicy::LastWriterWins => Some(conflict.local.clone()),
            })
        })
    }

    /// Makes the working snapshot the new base.
    pub(crate) fn commit_tree(&mut self) {
        self.tree.commit();
    }

    /// Marks the transaction as committed.
    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    /// Marks the transaction as aborted.
    pub(crate) fn mark_aborted(&mut self) {
        self.state = TransactionState::Aborted;
    }

    /// Ensures the transaction is active.
    pub(crate) fn ensure_active(&self) -> StoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(StoreError::AlreadyCommitted { id: self.id }),
            TransactionState::Aborted => Err(StoreError::Aborted { id: self.id }),
        }
    }
}

fn replay(ops: &[Arc<dyn Operator>], conflict: &Conflict) -> Option<Value> {
    let mut value = conflict.latest.clone();
    for op in ops {
        match op.execute(&value) {
            Ok(next) => value = next,
            Err(err) => {
                warn!(path = %conflict.path, error = %err, "operator replay failed");
                return None;
            }
        }
    }
    trace!(path = %conflict.path, count = ops.len(), "operators replayed");
    Some(value)
}
