//! Activities: observable logical units of work.
//!
//! A root activity reports its lifecycle to the store's
//! [`ActivityListener`]s:
//!
//! - sync action: `Begin`, `Success | Error`, `SyncComplete`, `Drained`
//! - async action: `Begin`, `SyncComplete`, `Success | Error`,
//!   `AsyncComplete`, `Drained`
//!
//! `Drained` fires once every task the activity scheduled through
//! [`spawn`], [`track`] or [`sleep`] has finished. Activities started while
//! another is ambient are nested: they run their body and report nothing.

mod listener;
mod record;
mod scope;

pub use listener::ActivityListener;
pub use record::{ActivityStats, LifecycleStage, Outcome, TaskKind};
pub use scope::ActivityScope;

pub(crate) use scope::{run_async, run_sync};

use crate::error::StoreError;
use crate::store::AppStore;
use scope::CURRENT_ACTIVITY;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Runs `action` as an activity named `name` on `store`.
pub fn run_inside_activity<T, E, F>(store: &AppStore, name: &str, action: F) -> Result<T, E>
where
    T: Any,
    F: FnOnce() -> Result<T, E>,
    E: From<StoreError> + fmt::Display,
{
    run_sync(store.inner(), name, action)
}

/// Runs the future produced by `action` as an activity named `name`.
pub async fn run_inside_activity_async<T, E, F, Fut>(
    store: &AppStore,
    name: &str,
    action: F,
) -> Result<T, E>
where
    T: Any,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<StoreError> + fmt::Display,
{
    run_async(store.inner(), name, action).await
}

/// Wraps `f` so that every call runs as an activity named `name`.
pub fn with_activity<A, T, E, F>(
    store: &AppStore,
    name: impl Into<String>,
    f: F,
) -> impl Fn(A) -> Result<T, E>
where
    T: Any,
    F: Fn(A) -> Result<T, E>,
    E: From<StoreError> + fmt::Display,
{
    let store = store.clone();
    let name = name.into();
    move |arg| store.activity(&name, || f(arg))
}

/// Spawns `future` on the tokio runtime as work of the ambient activity.
///
/// The task inherits the activity, so the activity does not drain before
/// the task finishes. Without an ambient activity this is `tokio::spawn`.
pub fn spawn<F>(kind: TaskKind, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match ActivityScope::current() {
        Some(activity) => {
            let guard = activity.begin_task(kind);
            tokio::spawn(CURRENT_ACTIVITY.scope(Some(activity), async move {
                let _guard = guard;
                future.await
            }))
        }
        None => tokio::spawn(future),
    }
}

/// Awaits `future`, counting it as pending work of the ambient activity.
pub async fn track<F: Future>(kind: TaskKind, future: F) -> F::Output {
    let guard = ActivityScope::current().map(|activity| activity.begin_task(kind));
    let output = future.await;
    drop(guard);
    output
}

/// Sleeps for `duration` as timer work of the ambient activity.
pub async fn sleep(duration: Duration) {
    track(TaskKind::Timer, tokio::time::sleep(duration)).await;
}

/// Returns the statistics of the ambient activity, if any.
pub fn current_stats() -> Option<ActivityStats> {
    ActivityScope::current().map(|activity| activity.stats())
}
