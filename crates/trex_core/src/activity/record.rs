//! Activity records and statistics.

use crate::types::ActivityId;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Kind of asynchronous work tracked by an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskKind {
    /// A detached task.
    Spawn,
    /// A timer.
    Timer,
    /// An I/O operation.
    Io,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Spawn => f.write_str("spawn"),
            TaskKind::Timer => f.write_str("timer"),
            TaskKind::Io => f.write_str("io"),
        }
    }
}

/// Lifecycle stage of a root activity, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    /// The activity started.
    Begin,
    /// The action succeeded.
    Success,
    /// The action failed.
    Error,
    /// The synchronous part of the action returned.
    SyncComplete,
    /// The asynchronous part of the action resolved.
    AsyncComplete,
    /// All work scheduled by the activity has finished.
    Drained,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleStage::Begin => "begin",
            LifecycleStage::Success => "success",
            LifecycleStage::Error => "error",
            LifecycleStage::SyncComplete => "sync-complete",
            LifecycleStage::AsyncComplete => "async-complete",
            LifecycleStage::Drained => "drained",
        };
        f.write_str(name)
    }
}

/// How an activity ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The action returned `Ok`.
    Success,
    /// The action returned an error, rendered with `Display`.
    Failed(String),
}

/// Completion statistics of a root activity.
///
/// Durations are measured from the start of the activity and are `None`
/// until the corresponding stage has fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityStats {
    /// Activity ID.
    pub id: ActivityId,
    /// Activity name.
    pub name: String,
    /// Result, once known.
    pub outcome: Option<Outcome>,
    /// Time until the synchronous part returned.
    pub sync_time: Option<Duration>,
    /// Time until the asynchronous part resolved.
    pub async_time: Option<Duration>,
    /// Time until all scheduled work drained.
    pub drain_time: Option<Duration>,
    /// Transactions committed while the activity was ambient.
    pub transactions: u64,
    /// Scheduled work, by kind.
    pub counters: BTreeMap<TaskKind, u64>,
}

impl ActivityStats {
    /// Returns true once the activity has failed.
    pub fn failed(&self) -> bool {
        matches!(self.outcome, Some(Outcome::Failed(_)))
    }
}
