//! In-memory subsystem manager.
//!
//! Pipelines are shared: a deployment whose [`PipelineConfig`] matches an
//! already registered pipeline reuses that pipeline's id. A pipeline is
//! retired when its last session stops.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::routines::{self, EventCounters, EventSnapshot, SubsystemEvent};
use super::SubsystemManager;
use crate::config::SubsystemConfig;
use crate::models::{
    ClientConfig, DeploymentConfig, HeuristicId, PipelineConfig, PipelineId, PipelineType,
    SessionConfig, SessionId, SessionRequest, SessionSummary,
};
use crate::tasks::TaskScope;
use crate::{AppError, Result};

#[derive(Debug)]
struct PipelineEntry {
    config: PipelineConfig,
    sessions: HashSet<SessionId>,
}

#[derive(Debug)]
struct SessionEntry {
    summary: SessionSummary,
    config: SessionConfig,
}

/// Pipeline and session tables guarded by the manager's lock.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pipelines: HashMap<PipelineId, PipelineEntry>,
    by_config: HashMap<PipelineConfig, PipelineId>,
    sessions: HashMap<SessionId, SessionEntry>,
}

impl Registry {
    /// `(pipelines, sessions)` currently registered.
    pub(crate) fn occupancy(&self) -> (usize, usize) {
        (self.pipelines.len(), self.sessions.len())
    }

    fn has_duplicate(&self, pipeline_id: PipelineId, session: &SessionConfig) -> bool {
        self.pipelines.get(&pipeline_id).is_some_and(|entry| {
            entry.sessions.iter().any(|sid| {
                self.sessions
                    .get(sid)
                    .is_some_and(|existing| existing.config == *session)
            })
        })
    }
}

/// In-memory [`SubsystemManager`] implementation.
#[derive(Debug)]
pub struct Manager {
    limits: SubsystemConfig,
    registry: Arc<Mutex<Registry>>,
    counters: Arc<EventCounters>,
    events_tx: mpsc::Sender<SubsystemEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<SubsystemEvent>>>,
}

impl Manager {
    /// Create an empty manager bounded by `limits`.
    #[must_use]
    pub fn new(limits: SubsystemConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(limits.event_buffer.max(1));
        Self {
            limits,
            registry: Arc::default(),
            counters: Arc::default(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Totals observed by the event loop so far.
    #[must_use]
    pub fn event_counters(&self) -> EventSnapshot {
        self.counters.snapshot()
    }

    /// Number of registered pipelines.
    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.lock().pipelines.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, deploy: DeploymentConfig) -> Result<SessionId> {
        let mut registry = self.lock();
        let pipeline_id = deploy.pipeline_id;

        let new_pipeline = !registry.pipelines.contains_key(&pipeline_id);
        if new_pipeline {
            if let Some(existing) = registry.by_config.get(&deploy.pipeline) {
                return Err(AppError::Session(format!(
                    "pipeline config already registered as {existing}"
                )));
            }
            if registry.pipelines.len() >= self.limits.max_pipelines {
                return Err(AppError::Capacity(format!(
                    "pipeline limit of {} reached",
                    self.limits.max_pipelines
                )));
            }
        } else if registry
            .pipelines
            .get(&pipeline_id)
            .is_some_and(|entry| entry.config != deploy.pipeline)
        {
            return Err(AppError::Session(format!(
                "pipeline {pipeline_id} is registered with a different config"
            )));
        }

        if registry.sessions.len() >= self.limits.max_sessions {
            return Err(AppError::Capacity(format!(
                "session limit of {} reached",
                self.limits.max_sessions
            )));
        }

        if registry.has_duplicate(pipeline_id, &deploy.session) {
            return Err(AppError::Session(format!(
                "identical {} session already running on pipeline {pipeline_id}",
                deploy.session.heuristic_type.as_str()
            )));
        }

        let session_id = SessionId::new();
        let id = HeuristicId {
            session_id,
            pipeline_id,
        };
        self.events_tx
            .try_send(SubsystemEvent::SessionStarted {
                id,
                heuristic_type: deploy.session.heuristic_type,
                new_pipeline,
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => {
                    AppError::Capacity("subsystem event queue is full".into())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    AppError::Unavailable("subsystem event loop is not running".into())
                }
            })?;

        let summary = SessionSummary {
            session_id,
            pipeline_id,
            network: deploy.session.network,
            heuristic_type: deploy.session.heuristic_type,
            pipeline_type: deploy.session.pipeline_type,
            started_at: Utc::now(),
        };

        registry
            .pipelines
            .entry(pipeline_id)
            .or_insert_with(|| PipelineEntry {
                config: deploy.pipeline.clone(),
                sessions: HashSet::new(),
            })
            .sessions
            .insert(session_id);
        registry.by_config.insert(deploy.pipeline, pipeline_id);
        registry.sessions.insert(
            session_id,
            SessionEntry {
                summary,
                config: deploy.session,
            },
        );

        Ok(session_id)
    }

    fn deregister(&self, id: HeuristicId) -> Result<()> {
        let mut registry = self.lock();

        let bound_to = registry
            .sessions
            .get(&id.session_id)
            .map(|entry| entry.summary.pipeline_id);
        if bound_to != Some(id.pipeline_id) {
            return Err(AppError::NotFound(format!(
                "session {} not running on pipeline {}",
                id.session_id, id.pipeline_id
            )));
        }
        registry.sessions.remove(&id.session_id);

        let mut pipeline_retired = false;
        if let Some(entry) = registry.pipelines.get_mut(&id.pipeline_id) {
            entry.sessions.remove(&id.session_id);
            if entry.sessions.is_empty() {
                pipeline_retired = true;
            }
        }
        if pipeline_retired {
            if let Some(entry) = registry.pipelines.remove(&id.pipeline_id) {
                registry.by_config.remove(&entry.config);
            }
        }
        drop(registry);

        if let Err(err) = self.events_tx.try_send(SubsystemEvent::SessionStopped {
            id,
            pipeline_retired,
        }) {
            warn!(session_id = %id.session_id, %err, "failed to publish session stop event");
        }

        Ok(())
    }
}

impl SubsystemManager for Manager {
    fn build_pipeline_cfg(&self, request: &SessionRequest) -> Result<PipelineConfig> {
        match request.pipeline_type {
            PipelineType::Live => {
                if request.end_height.is_some() {
                    return Err(AppError::Pipeline(
                        "live pipelines cannot set end_height".into(),
                    ));
                }
            }
            PipelineType::Backtest => match (request.start_height, request.end_height) {
                (Some(start), Some(end)) if start <= end => {}
                (Some(start), Some(end)) => {
                    return Err(AppError::Pipeline(format!(
                        "backtest start_height {start} is after end_height {end}"
                    )));
                }
                _ => {
                    return Err(AppError::Pipeline(
                        "backtest pipelines require start_height and end_height".into(),
                    ));
                }
            },
        }

        let missing: Vec<&str> = request
            .heuristic_type
            .required_params()
            .iter()
            .copied()
            .filter(|key| !request.heuristic_params.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Pipeline(format!(
                "{} is missing heuristic params: {}",
                request.heuristic_type.as_str(),
                missing.join(", ")
            )));
        }

        Ok(PipelineConfig {
            network: request.network,
            data_type: request.heuristic_type.input_type(),
            pipeline_type: request.pipeline_type,
            client: ClientConfig {
                start_height: request.start_height,
                end_height: request.end_height,
            },
        })
    }

    fn build_deploy_cfg(
        &self,
        pipeline: PipelineConfig,
        session: SessionConfig,
    ) -> Result<DeploymentConfig> {
        if pipeline.network != session.network {
            return Err(AppError::Deploy(
                "session network does not match pipeline network".into(),
            ));
        }
        if pipeline.pipeline_type != session.pipeline_type {
            return Err(AppError::Deploy(
                "session pipeline type does not match pipeline".into(),
            ));
        }
        if pipeline.data_type != session.heuristic_type.input_type() {
            return Err(AppError::Deploy(format!(
                "{} cannot consume pipeline data",
                session.heuristic_type.as_str()
            )));
        }

        let registry = self.lock();
        let pipeline_id = if let Some(existing) = registry.by_config.get(&pipeline) {
            *existing
        } else if registry.pipelines.len() >= self.limits.max_pipelines {
            return Err(AppError::Capacity(format!(
                "pipeline limit of {} reached",
                self.limits.max_pipelines
            )));
        } else {
            PipelineId::new()
        };
        drop(registry);

        Ok(DeploymentConfig {
            pipeline_id,
            pipeline,
            session,
        })
    }

    fn run_session(
        &self,
        deploy: DeploymentConfig,
    ) -> Pin<Box<dyn Future<Output = Result<SessionId>> + Send + '_>> {
        Box::pin(async move { self.register(deploy) })
    }

    fn stop_session(
        &self,
        id: HeuristicId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.deregister(id) })
    }

    fn start_event_routines(&self, scope: &TaskScope) -> Result<()> {
        let events = self
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| AppError::Start("subsystem event routines already started".into()))?;

        scope.spawn(
            "subsystem_events",
            routines::event_loop(events, Arc::clone(&self.counters), scope.token()),
        );
        scope.spawn(
            "subsystem_status",
            routines::status_loop(
                Arc::clone(&self.registry),
                Duration::from_secs(self.limits.heartbeat_seconds.max(1)),
                scope.token(),
            ),
        );

        info!("subsystem event routines spawned");
        Ok(())
    }

    fn sessions(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .lock()
            .sessions
            .values()
            .map(|entry| entry.summary.clone())
            .collect();
        sessions.sort_by_key(|summary| summary.started_at);
        sessions
    }
}
