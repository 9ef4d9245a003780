//! Long-lived event routines of the in-memory subsystem manager.
//!
//! Two tasks run for the lifetime of the process:
//! - the event loop drains [`SubsystemEvent`]s emitted by session
//!   registration and keeps [`EventCounters`] current;
//! - the status loop periodically reports registry occupancy.
//!
//! Both stop when the scope's cancellation token fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::manager::Registry;
use crate::models::{HeuristicId, HeuristicType};

/// Registry change emitted by the manager towards its event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsystemEvent {
    /// A session was accepted.
    SessionStarted {
        /// Correlated session and pipeline ids.
        id: HeuristicId,
        /// Heuristic the session evaluates.
        heuristic_type: HeuristicType,
        /// Whether the session brought a new pipeline up.
        new_pipeline: bool,
    },
    /// A session was stopped.
    SessionStopped {
        /// Correlated session and pipeline ids.
        id: HeuristicId,
        /// Whether its pipeline had no remaining sessions and was retired.
        pipeline_retired: bool,
    },
}

/// Running totals of events processed by the event loop.
#[derive(Debug, Default)]
pub struct EventCounters {
    sessions_started: AtomicU64,
    sessions_stopped: AtomicU64,
    pipelines_started: AtomicU64,
    pipelines_retired: AtomicU64,
}

/// Point-in-time copy of [`EventCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSnapshot {
    /// Sessions seen starting.
    pub sessions_started: u64,
    /// Sessions seen stopping.
    pub sessions_stopped: u64,
    /// Pipelines brought up.
    pub pipelines_started: u64,
    /// Pipelines retired after their last session stopped.
    pub pipelines_retired: u64,
}

impl EventCounters {
    /// Copy the current totals.
    #[must_use]
    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot {
            sessions_started: self.sessions_started.load(Ordering::SeqCst),
            sessions_stopped: self.sessions_stopped.load(Ordering::SeqCst),
            pipelines_started: self.pipelines_started.load(Ordering::SeqCst),
            pipelines_retired: self.pipelines_retired.load(Ordering::SeqCst),
        }
    }

    fn apply(&self, event: &SubsystemEvent) {
        match event {
            SubsystemEvent::SessionStarted {
                id,
                heuristic_type,
                new_pipeline,
            } => {
                self.sessions_started.fetch_add(1, Ordering::SeqCst);
                if *new_pipeline {
                    self.pipelines_started.fetch_add(1, Ordering::SeqCst);
                    info!(pipeline_id = %id.pipeline_id, "pipeline started");
                }
                info!(
                    session_id = %id.session_id,
                    pipeline_id = %id.pipeline_id,
                    heuristic = heuristic_type.as_str(),
                    "session running"
                );
            }
            SubsystemEvent::SessionStopped {
                id,
                pipeline_retired,
            } => {
                self.sessions_stopped.fetch_add(1, Ordering::SeqCst);
                info!(session_id = %id.session_id, "session stopped");
                if *pipeline_retired {
                    self.pipelines_retired.fetch_add(1, Ordering::SeqCst);
                    info!(pipeline_id = %id.pipeline_id, "pipeline retired");
                }
            }
        }
    }
}

/// Drain subsystem events until cancelled or every sender is dropped.
pub(crate) async fn event_loop(
    mut events: mpsc::Receiver<SubsystemEvent>,
    counters: Arc<EventCounters>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("subsystem event loop shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("subsystem event channel closed");
                    break;
                };
                counters.apply(&event);
            }
        }
    }
}

/// Report registry occupancy every `period` until cancelled.
pub(crate) async fn status_loop(
    registry: Arc<Mutex<Registry>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("subsystem status loop shutting down");
                break;
            }
            _ = interval.tick() => {
                let (pipelines, sessions) = registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .occupancy();
                info!(pipelines, sessions, "subsystem status");
            }
        }
    }
}
