//! Shared cancellation and tracking for long-lived background tasks.
//!
//! Every task started during application start-up (metrics exporter,
//! subsystem event routines, API server) is spawned through one
//! [`TaskScope`]. Shutdown cancels the scope's token and then waits for
//! the tracked tasks to finish.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info_span, Instrument};

/// Cancellation token plus task tracker shared by all background routines.
#[derive(Debug, Clone, Default)]
pub struct TaskScope {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl TaskScope {
    /// Create an empty, uncancelled scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token observed by tasks in this scope.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a tracked task wrapped in a `task` span named after it.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task.instrument(info_span!("task", name)))
    }

    /// Signal every task in the scope to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Number of tracked tasks that have not finished yet.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Close the scope and wait up to `grace` for its tasks to finish.
    ///
    /// Returns `false` when the grace period elapsed first.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }
}
