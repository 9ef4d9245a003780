//! Metrics emission.
//!
//! The [`Metricer`] trait is the surface the application controller and the
//! bootstrap protocol report through. [`Metrics`] is the process-local
//! implementation serving Prometheus text format on `/metrics`.

pub mod exporter;

use std::future::Future;
use std::pin::Pin;

use crate::errors::BootstrapStage;
use crate::models::{HeuristicId, HeuristicType};
use crate::tasks::TaskScope;
use crate::Result;

pub use exporter::Metrics;

/// Sink for process-level observability signals.
pub trait Metricer: Send + Sync {
    /// Start serving metrics. Long-lived work must be spawned on `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Start`](crate::AppError::Start) if the exporter
    /// cannot bind its listener.
    fn start<'a>(
        &'a self,
        scope: &'a TaskScope,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// One-shot liveness heartbeat emitted after every subsystem started.
    fn record_up(&self);

    /// A bootstrap request produced a running session.
    fn record_session_started(&self, id: &HeuristicId, heuristic: HeuristicType);

    /// A session was stopped again by bootstrap rollback.
    fn record_session_stopped(&self, id: &HeuristicId);

    /// A bootstrap request failed at `stage`.
    fn record_bootstrap_failure(&self, stage: BootstrapStage);
}
