//! Bootstrap protocol: session requests in, running sessions out.
//!
//! Each request is driven through the subsystem manager in four delegated
//! steps (pipeline config, session config, deployment config, run) strictly
//! in input order. The first failing step ends the batch. What happens to
//! sessions the batch already started is governed by
//! [`PartialFailurePolicy`].

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::PartialFailurePolicy;
use crate::errors::{BootstrapError, BootstrapStage};
use crate::metrics::Metricer;
use crate::models::{HeuristicId, SessionRequest, SessionSummary};
use crate::subsystem::SubsystemManager;
use crate::AppError;

/// Drives batches of session requests through the subsystem manager.
///
/// Calls are serialized: concurrent callers wait for the batch in flight to
/// finish before their own starts.
pub struct Bootstrapper {
    subsystems: Arc<dyn SubsystemManager>,
    metrics: Arc<dyn Metricer>,
    policy: PartialFailurePolicy,
    serial: Mutex<()>,
}

impl Bootstrapper {
    /// Create a bootstrapper over the given collaborators.
    #[must_use]
    pub fn new(
        subsystems: Arc<dyn SubsystemManager>,
        metrics: Arc<dyn Metricer>,
        policy: PartialFailurePolicy,
    ) -> Self {
        Self {
            subsystems,
            metrics,
            policy,
            serial: Mutex::new(()),
        }
    }

    /// Sessions currently known to the subsystem manager.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.subsystems.sessions()
    }

    /// Start one session per request and return their ids in input order.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] naming the first request that failed and
    /// the stage it failed at. Sessions started for earlier requests are
    /// listed in `started` (kept running) or `rolled_back` (stopped),
    /// depending on the configured policy.
    pub async fn bootstrap(
        &self,
        requests: &[SessionRequest],
    ) -> Result<Vec<HeuristicId>, BootstrapError> {
        let span = info_span!("bootstrap", batch = requests.len());
        async move {
            let _serial = self.serial.lock().await;
            let mut ids = Vec::with_capacity(requests.len());

            for (index, request) in requests.iter().enumerate() {
                match self.start_one(request).await {
                    Ok(id) => {
                        info!(
                            index,
                            session_id = %id.session_id,
                            pipeline_id = %id.pipeline_id,
                            "heuristic session started"
                        );
                        self.metrics
                            .record_session_started(&id, request.heuristic_type);
                        ids.push(id);
                    }
                    Err((stage, source)) => {
                        warn!(index, %stage, %source, "bootstrap request failed");
                        self.metrics.record_bootstrap_failure(stage);
                        return Err(self.fail(index, stage, source, ids).await);
                    }
                }
            }

            Ok(ids)
        }
        .instrument(span)
        .await
    }

    async fn start_one(
        &self,
        request: &SessionRequest,
    ) -> Result<HeuristicId, (BootstrapStage, AppError)> {
        let pipeline = self
            .subsystems
            .build_pipeline_cfg(request)
            .map_err(|err| (BootstrapStage::PipelineConfig, err))?;

        let session = request.session_config();

        let deploy = self
            .subsystems
            .build_deploy_cfg(pipeline, session)
            .map_err(|err| (BootstrapStage::DeployConfig, err))?;
        let pipeline_id = deploy.pipeline_id;

        let session_id = self
            .subsystems
            .run_session(deploy)
            .await
            .map_err(|err| (BootstrapStage::RunSession, err))?;

        Ok(HeuristicId {
            session_id,
            pipeline_id,
        })
    }

    async fn fail(
        &self,
        index: usize,
        stage: BootstrapStage,
        source: AppError,
        started: Vec<HeuristicId>,
    ) -> BootstrapError {
        match self.policy {
            PartialFailurePolicy::KeepStarted => {
                if !started.is_empty() {
                    info!(
                        kept = started.len(),
                        "sessions started earlier in the batch remain running"
                    );
                }
                BootstrapError {
                    index,
                    stage,
                    source,
                    started,
                    rolled_back: Vec::new(),
                }
            }
            PartialFailurePolicy::RollbackAll => {
                let mut still_running = Vec::new();
                let mut rolled_back = Vec::with_capacity(started.len());

                for id in started.into_iter().rev() {
                    match self.subsystems.stop_session(id).await {
                        Ok(()) => {
                            info!(session_id = %id.session_id, "rolled back session");
                            self.metrics.record_session_stopped(&id);
                            rolled_back.push(id);
                        }
                        Err(err) => {
                            error!(session_id = %id.session_id, %err, "rollback failed");
                            still_running.push(id);
                        }
                    }
                }
                still_running.reverse();
                rolled_back.reverse();

                BootstrapError {
                    index,
                    stage,
                    source,
                    started: still_running,
                    rolled_back,
                }
            }
        }
    }
}
