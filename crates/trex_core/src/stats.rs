//! Store statistics.
//!
//! ```rust,ignore
//! let store = AppStore::new();
//! // ... run transactions ...
//! let stats = store.stats();
//! println!("committed: {}", stats.transactions_committed);
//! println!("conflicts: {}", stats.conflicts);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Store counters.
///
/// All counters are atomic and only ever increase.
#[derive(Debug, Default)]
pub struct StoreStats {
    // Transaction counters
    /// Root transactions started.
    transactions_started: AtomicU64,
    /// Root transactions that published a new state.
    transactions_committed: AtomicU64,
    /// Root transactions that committed without changes.
    transactions_empty: AtomicU64,
    /// Root transactions aborted by an error or conflict.
    transactions_aborted: AtomicU64,

    // Concurrency counters
    /// Commits that had to rebase onto a newer state.
    rebases: AtomicU64,
    /// Rebases that failed with a conflict.
    conflicts: AtomicU64,

    // Observer counters
    /// Subscriber callbacks invoked.
    notifications: AtomicU64,
    /// Root activities started.
    activities_started: AtomicU64,
    /// Root activities that ended with an error.
    activities_failed: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_empty(&self) {
        self.transactions_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rebase(&self) {
        self.rebases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_activity_start(&self) {
        self.activities_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_activity_failure(&self) {
        self.activities_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of root transactions started.
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions that published a new state.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions aborted.
    pub fn transactions_aborted(&self) -> u64 {
        self.transactions_aborted.load(Ordering::Relaxed)
    }

    /// Returns the number of rebase conflicts.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started(),
            transactions_committed: self.transactions_committed(),
            transactions_empty: self.transactions_empty.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted(),
            rebases: self.rebases.load(Ordering::Relaxed),
            conflicts: self.conflicts(),
            notifications: self.notifications.load(Ordering::Relaxed),
            activities_started: self.activities_started.load(Ordering::Relaxed),
            activities_failed: self.activities_failed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Root transactions started.
    pub transactions_started: u64,
    /// Root transactions that published a new state.
    pub transactions_committed: u64,
    /// Root transactions that committed without changes.
    pub transactions_empty: u64,
    /// Root transactions aborted.
    pub transactions_aborted: u64,
    /// Commits that rebased onto a newer state.
    pub rebases: u64,
    /// Rebases that failed with a conflict.
    pub conflicts: u64,
    /// Subscriber callbacks invoked.
    pub notifications: u64,
    /// Root activities started.
    pub activities_started: u64,
    /// Root activities that ended with an error.
    pub activities_failed: u64,
}
