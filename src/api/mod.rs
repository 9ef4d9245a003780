//! API surface through which external callers submit session requests.
//!
//! [`ApiServer`] is the seam the application controller starts; [`HttpServer`]
//! is the axum implementation. The JSON shapes in this module are the wire
//! contract of `POST /v0/heuristic`.

pub mod server;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::errors::{BootstrapError, BootstrapStage};
use crate::models::{HeuristicId, SessionRequest};
use crate::tasks::TaskScope;
use crate::Result;

pub use server::HttpServer;

/// Server started by the application controller once event routines run.
pub trait ApiServer: Send + Sync {
    /// Bind and start serving. Long-lived work must be spawned on `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Start`](crate::AppError::Start) if the listener
    /// cannot be bound.
    fn start<'a>(
        &'a self,
        scope: &'a TaskScope,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Body of `POST /v0/heuristic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapBody {
    /// Requests, processed in order.
    pub sessions: Vec<SessionRequest>,
}

/// Successful response of `POST /v0/heuristic`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapAccepted {
    /// One id per request, in request order.
    pub ids: Vec<HeuristicId>,
}

/// Error response of `POST /v0/heuristic`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapRejected {
    /// Human-readable failure.
    pub error: String,
    /// Index of the failing request.
    pub index: usize,
    /// Stage that failed.
    pub stage: String,
    /// Sessions from earlier requests still running.
    pub started: Vec<HeuristicId>,
    /// Sessions from earlier requests that were stopped again.
    pub rolled_back: Vec<HeuristicId>,
}

impl From<&BootstrapError> for BootstrapRejected {
    fn from(err: &BootstrapError) -> Self {
        Self {
            error: err.source.to_string(),
            index: err.index,
            stage: err.stage.as_str().to_owned(),
            started: err.started.clone(),
            rolled_back: err.rolled_back.clone(),
        }
    }
}

impl BootstrapRejected {
    /// Stage parsed back from its wire label.
    #[must_use]
    pub fn stage(&self) -> Option<BootstrapStage> {
        match self.stage.as_str() {
            "pipeline_config" => Some(BootstrapStage::PipelineConfig),
            "deploy_config" => Some(BootstrapStage::DeployConfig),
            "run_session" => Some(BootstrapStage::RunSession),
            _ => None,
        }
    }
}
