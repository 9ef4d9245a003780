//! Subsystem manager: turns session requests into running pipelines.
//!
//! The [`SubsystemManager`] trait is the collaborator contract the bootstrap
//! protocol drives stage by stage. [`Manager`] is the in-memory
//! implementation used by the binary: it keeps the pipeline and session
//! registries and runs the event routines that observe them.

pub mod manager;
pub mod routines;

use std::future::Future;
use std::pin::Pin;

use crate::models::{
    DeploymentConfig, HeuristicId, PipelineConfig, SessionConfig, SessionId, SessionRequest,
    SessionSummary,
};
use crate::tasks::TaskScope;
use crate::Result;

pub use manager::Manager;
pub use routines::SubsystemEvent;

/// Collaborator contract between the application core and the pipeline
/// subsystem.
pub trait SubsystemManager: Send + Sync {
    /// Derive the pipeline topology a request needs.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Pipeline`](crate::AppError::Pipeline) if the
    /// request is malformed.
    fn build_pipeline_cfg(&self, request: &SessionRequest) -> Result<PipelineConfig>;

    /// Combine a pipeline with session parameters and assign its pipeline id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Deploy`](crate::AppError::Deploy) if the pair is
    /// inconsistent, or [`AppError::Capacity`](crate::AppError::Capacity)
    /// if no further pipeline can be registered.
    fn build_deploy_cfg(
        &self,
        pipeline: PipelineConfig,
        session: SessionConfig,
    ) -> Result<DeploymentConfig>;

    /// Run a deployment and return the id of its new session.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) for
    /// conflicting deployments, or
    /// [`AppError::Capacity`](crate::AppError::Capacity) when the session
    /// limit is reached.
    fn run_session(
        &self,
        deploy: DeploymentConfig,
    ) -> Pin<Box<dyn Future<Output = Result<SessionId>> + Send + '_>>;

    /// Stop a running session, retiring its pipeline if it was the last user.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) if the
    /// session is not running on that pipeline.
    fn stop_session(
        &self,
        id: HeuristicId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Spawn the long-lived event routines on `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Start`](crate::AppError::Start) if the routines
    /// cannot be started, e.g. because they are already running.
    fn start_event_routines(&self, scope: &TaskScope) -> Result<()>;

    /// Snapshot of the running sessions.
    fn sessions(&self) -> Vec<SessionSummary>;
}
