//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use crate::models::HeuristicId;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A subsystem failed to come up during application start.
    Start(String),
    /// A session request could not be turned into a pipeline configuration.
    Pipeline(String),
    /// A deployment configuration could not be built.
    Deploy(String),
    /// The subsystem manager refused or failed to run a session.
    Session(String),
    /// A pipeline or session limit has been reached.
    Capacity(String),
    /// The subsystem manager is not accepting work, e.g. after shutdown.
    Unavailable(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// HTTP API failure.
    Api(String),
    /// A bootstrap batch failed part-way through.
    Bootstrap(Box<BootstrapError>),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Start(msg) => write!(f, "start: {msg}"),
            Self::Pipeline(msg) => write!(f, "pipeline: {msg}"),
            Self::Deploy(msg) => write!(f, "deploy: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Capacity(msg) => write!(f, "capacity: {msg}"),
            Self::Unavailable(msg) => write!(f, "unavailable: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Api(msg) => write!(f, "api: {msg}"),
            Self::Bootstrap(err) => write!(f, "bootstrap: {err}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("invalid session request json: {err}"))
    }
}

impl From<BootstrapError> for AppError {
    fn from(err: BootstrapError) -> Self {
        Self::Bootstrap(Box::new(err))
    }
}

/// Delegated step of the bootstrap protocol that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStage {
    /// Building the pipeline configuration from the request.
    PipelineConfig,
    /// Building the deployment configuration (assigns the pipeline id).
    DeployConfig,
    /// Handing the deployment to the subsystem manager.
    RunSession,
}

impl BootstrapStage {
    /// Stable label used in logs, metrics and API responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PipelineConfig => "pipeline_config",
            Self::DeployConfig => "deploy_config",
            Self::RunSession => "run_session",
        }
    }
}

impl Display for BootstrapStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one request inside a bootstrap batch.
///
/// Requests before `index` were started successfully. Depending on the
/// configured partial-failure policy they are either still running
/// (listed in `started`) or were stopped again (listed in `rolled_back`).
#[derive(Debug)]
pub struct BootstrapError {
    /// Zero-based position of the failing request in the batch.
    pub index: usize,
    /// Stage that failed for that request.
    pub stage: BootstrapStage,
    /// The stage's own error.
    pub source: AppError,
    /// Sessions from earlier requests that remain running.
    pub started: Vec<HeuristicId>,
    /// Sessions from earlier requests that were stopped by rollback.
    pub rolled_back: Vec<HeuristicId>,
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "request {} failed at {}: {}",
            self.index, self.stage, self.source
        )
    }
}

impl std::error::Error for BootstrapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
