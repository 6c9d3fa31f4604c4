//! Ambient activity scope.

use super::listener::{dispatch, Detail};
use super::record::{ActivityStats, LifecycleStage, Outcome, TaskKind};
use crate::error::StoreError;
use crate::store::StoreInner;
use crate::transaction;
use crate::types::ActivityId;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

tokio::task_local! {
    pub(super) static CURRENT_ACTIVITY: Option<Arc<ActivityScope>>;
}

#[derive(Debug, Default)]
struct Timeline {
    outcome: Option<Outcome>,
    sync_time: Option<Duration>,
    async_time: Option<Duration>,
    drain_time: Option<Duration>,
}

/// A root activity: a logical unit of work observed by activity listeners.
pub struct ActivityScope {
    id: ActivityId,
    name: String,
    store: Arc<StoreInner>,
    started: Instant,
    timeline: Mutex<Timeline>,
    transactions: AtomicU64,
    counters: Mutex<BTreeMap<TaskKind, u64>>,
    pending: AtomicUsize,
    body_done: AtomicBool,
    drained: AtomicBool,
}

impl ActivityScope {
    fn start(store: &Arc<StoreInner>, name: &str) -> Arc<Self> {
        let activity = Arc::new(Self {
            id: store.next_activity_id(),
            name: name.to_string(),
            store: Arc::clone(store),
            started: Instant::now(),
            timeline: Mutex::new(Timeline::default()),
            transactions: AtomicU64::new(0),
            counters: Mutex::new(BTreeMap::new()),
            pending: AtomicUsize::new(0),
            body_done: AtomicBool::new(false),
            drained: AtomicBool::new(false),
        });
        store.stats.record_activity_start();
        activity.emit(LifecycleStage::Begin, Detail::None);
        activity
    }

    /// Returns the root activity of the current call chain, if any.
    pub fn current() -> Option<Arc<Self>> {
        CURRENT_ACTIVITY.try_with(Clone::clone).ok().flatten()
    }

    pub(crate) fn current_for(store: &Arc<StoreInner>) -> Option<Arc<Self>> {
        Self::current().filter(|activity| Arc::ptr_eq(&activity.store, store))
    }

    /// Returns the activity ID.
    pub fn id(&self) -> ActivityId {
        self.id
    }

    /// Returns the activity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of scheduled tasks still running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Returns true once the drained stage has fired.
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }

    /// Returns the statistics collected so far.
    pub fn stats(&self) -> ActivityStats {
        let timeline = self.timeline.lock();
        ActivityStats {
            id: self.id,
            name: self.name.clone(),
            outcome: timeline.outcome.clone(),
            sync_time: timeline.sync_time,
            async_time: timeline.async_time,
            drain_time: timeline.drain_time,
            transactions: self.transactions.load(Ordering::Relaxed),
            counters: self.counters.lock().clone(),
        }
    }

    pub(crate) fn record_transaction(&self) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn begin_task(self: &Arc<Self>, kind: TaskKind) -> TaskGuard {
        *self.counters.lock().entry(kind).or_insert(0) += 1;
        self.pending.fetch_add(1, Ordering::SeqCst);
        trace!(activity = %self.id, %kind, "task scheduled");
        TaskGuard {
            activity: Arc::clone(self),
        }
    }

    fn task_done(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.try_drain();
        }
    }

    fn settle<T: Any, E: fmt::Display>(&self, result: &Result<T, E>) {
        match result {
            Ok(value) => {
                self.timeline.lock().outcome = Some(Outcome::Success);
                self.emit(LifecycleStage::Success, Detail::Result(value));
            }
            Err(err) => {
                let message = err.to_string();
                self.timeline.lock().outcome = Some(Outcome::Failed(message.clone()));
                self.store.stats.record_activity_failure();
                self.emit(LifecycleStage::Error, Detail::Error(&message));
            }
        }
    }

    fn complete(&self, stage: LifecycleStage) {
        let elapsed = self.started.elapsed();
        {
            let mut timeline = self.timeline.lock();
            match stage {
                LifecycleStage::SyncComplete => timeline.sync_time = Some(elapsed),
                LifecycleStage::AsyncComplete => timeline.async_time = Some(elapsed),
                _ => {}
            }
        }
        self.emit(stage, Detail::None);
    }

    fn finish_body(&self) {
        self.body_done.store(true, Ordering::SeqCst);
        self.try_drain();
    }

    fn try_drain(&self) {
        if !self.body_done.load(Ordering::SeqCst) || self.pending.load(Ordering::SeqCst) != 0 {
            return;
        }
        if self.drained.swap(true, Ordering::SeqCst) {
            return;
        }
        self.timeline.lock().drain_time = Some(self.started.elapsed());
        self.emit(LifecycleStage::Drained, Detail::None);
    }

    fn emit(&self, stage: LifecycleStage, detail: Detail<'_>) {
        debug!(activity = %self.id, activity_name = %self.name, %stage, "activity");
        for listener in self.store.activity_listeners.snapshot() {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                dispatch(listener.as_ref(), self, stage, detail);
            }));
            if delivered.is_err() {
                warn!(activity = %self.id, %stage, "activity listener panicked");
            }
        }
    }
}

impl fmt::Debug for ActivityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityScope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Keeps a scheduled task counted as pending until dropped.
pub(super) struct TaskGuard {
    activity: Arc<ActivityScope>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.activity.task_done();
    }
}

fn body_sync<T, E, F>(store: &Arc<StoreInner>, action: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<StoreError>,
{
    if store.config.activity_auto_begin_transaction {
        transaction::run_sync(store, action)
    } else {
        action()
    }
}

async fn body_async<T, E, F, Fut>(store: &Arc<StoreInner>, action: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<StoreError>,
{
    if store.config.activity_auto_begin_transaction {
        transaction::run_async(store, action).await
    } else {
        action().await
    }
}

/// Runs `action` as an activity on `store`.
///
/// Only a root activity emits lifecycle stages; a nested one just runs.
pub(crate) fn run_sync<T, E, F>(store: &Arc<StoreInner>, name: &str, action: F) -> Result<T, E>
where
    T: Any,
    F: FnOnce() -> Result<T, E>,
    E: From<StoreError> + fmt::Display,
{
    if let Some(parent) = ActivityScope::current_for(store) {
        trace!(parent = %parent.id(), activity = name, "nested activity");
        return body_sync(store, action);
    }

    let activity = ActivityScope::start(store, name);
    let result =
        CURRENT_ACTIVITY.sync_scope(Some(Arc::clone(&activity)), || body_sync(store, action));
    activity.settle(&result);
    activity.complete(LifecycleStage::SyncComplete);
    activity.finish_body();
    result
}

/// Async form of [`run_sync`].
///
/// Calling `action` is the synchronous part; the returned future is the
/// asynchronous part.
pub(crate) async fn run_async<T, E, F, Fut>(
    store: &Arc<StoreInner>,
    name: &str,
    action: F,
) -> Result<T, E>
where
    T: Any,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<StoreError> + fmt::Display,
{
    if let Some(parent) = ActivityScope::current_for(store) {
        trace!(parent = %parent.id(), activity = name, "nested activity");
        return body_async(store, action).await;
    }

    let activity = ActivityScope::start(store, name);
    let future = CURRENT_ACTIVITY.sync_scope(Some(Arc::clone(&activity)), action);
    activity.complete(LifecycleStage::SyncComplete);

    let result = CURRENT_ACTIVITY
        .scope(Some(Arc::clone(&activity)), body_async(store, move || future))
        .await;
    activity.settle(&result);
    activity.complete(LifecycleStage::AsyncComplete);
    activity.finish_body();
    result
}
