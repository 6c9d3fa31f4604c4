//! Activity listener that records every lifecycle stage.

use parking_lot::Mutex;
use std::any::Any;
use std::time::Duration;
use trex_core::{ActivityId, ActivityListener, ActivityScope, LifecycleStage};

/// One recorded lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    /// Activity that reported the stage.
    pub activity: ActivityId,
    /// Activity name.
    pub name: String,
    /// The stage.
    pub stage: LifecycleStage,
    /// Error message, for `Error` stages.
    pub error: Option<String>,
}

/// Records lifecycle stages in the order they are reported.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingListener {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded event.
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().clone()
    }

    /// Returns the recorded stages, all activities interleaved.
    pub fn stages(&self) -> Vec<LifecycleStage> {
        self.events.lock().iter().map(|event| event.stage).collect()
    }

    /// Returns the stages reported by one activity.
    pub fn stages_of(&self, activity: ActivityId) -> Vec<LifecycleStage> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.activity == activity)
            .map(|event| event.stage)
            .collect()
    }

    /// Returns true once any activity named `name` has drained.
    pub fn drained(&self, name: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|event| event.name == name && event.stage == LifecycleStage::Drained)
    }

    /// Waits until the activity named `name` drains, polling every
    /// millisecond. Returns false on timeout.
    pub async fn wait_for_drain(&self, name: &str, timeout: Duration) -> bool {
        let poll = async {
            while !self.drained(name) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    /// Forgets every recorded event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, activity: &ActivityScope, stage: LifecycleStage, error: Option<&str>) {
        self.events.lock().push(StageEvent {
            activity: activity.id(),
            name: activity.name().to_string(),
            stage,
            error: error.map(str::to_string),
        });
    }
}

impl ActivityListener for RecordingListener {
    fn on_begin(&self, activity: &ActivityScope) {
        self.push(activity, LifecycleStage::Begin, None);
    }

    fn on_success(&self, activity: &ActivityScope, _result: &dyn Any) {
        self.push(activity, LifecycleStage::Success, None);
    }

    fn on_error(&self, activity: &ActivityScope, error: &str) {
        self.push(activity, LifecycleStage::Error, Some(error));
    }

    fn on_sync_complete(&self, activity: &ActivityScope) {
        self.push(activity, LifecycleStage::SyncComplete, None);
    }

    fn on_async_complete(&self, activity: &ActivityScope) {
        self.push(activity, LifecycleStage::AsyncComplete, None);
    }

    fn on_drained(&self, activity: &ActivityScope) {
        self.push(activity, LifecycleStage::Drained, None);
    }
}
