//! Activity lifecycle observers.

use super::record::LifecycleStage;
use super::scope::ActivityScope;
use std::any::Any;

/// Observer of root activity lifecycles.
///
/// Every method has an empty default, so implementations only override the
/// stages they care about. A panicking listener is logged and skipped.
pub trait ActivityListener: Send + Sync {
    /// A root activity started.
    fn on_begin(&self, _activity: &ActivityScope) {}

    /// The activity's action succeeded with `result`, the `Ok` value.
    ///
    /// Downcast `result` to read it.
    fn on_success(&self, _activity: &ActivityScope, _result: &dyn Any) {}

    /// The activity's action failed with `error`.
    fn on_error(&self, _activity: &ActivityScope, _error: &str) {}

    /// The synchronous part of the action returned.
    fn on_sync_complete(&self, _activity: &ActivityScope) {}

    /// The asynchronous part of the action resolved.
    fn on_async_complete(&self, _activity: &ActivityScope) {}

    /// Every task the activity scheduled has finished. Fires once.
    fn on_drained(&self, _activity: &ActivityScope) {}
}

/// What a stage carries besides the activity.
#[derive(Clone, Copy)]
pub(crate) enum Detail<'a> {
    None,
    Result(&'a dyn Any),
    Error(&'a str),
}

/// Dispatches one stage to `listener`.
pub(crate) fn dispatch(
    listener: &dyn ActivityListener,
    activity: &ActivityScope,
    stage: LifecycleStage,
    detail: Detail<'_>,
) {
    match (stage, detail) {
        (LifecycleStage::Begin, _) => listener.on_begin(activity),
        (LifecycleStage::Success, Detail::Result(result)) => listener.on_success(activity, result),
        (LifecycleStage::Success, _) => listener.on_success(activity, &()),
        (LifecycleStage::Error, Detail::Error(error)) => listener.on_error(activity, error),
        (LifecycleStage::Error, _) => listener.on_error(activity, ""),
        (LifecycleStage::SyncComplete, _) => listener.on_sync_complete(activity),
        (LifecycleStage::AsyncComplete, _) => listener.on_async_complete(activity),
        (LifecycleStage::Drained, _) => listener.on_drained(activity),
    }
}
