//! Global configuration parsing and validation.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::models::SessionRequest;
use crate::{AppError, Result};

/// What bootstrap does with sessions started earlier in a batch when a
/// later request fails.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailurePolicy {
    /// Leave earlier sessions running and report them alongside the error.
    #[default]
    KeepStarted,
    /// Stop every session the failed batch started.
    RollbackAll,
}

/// API server listener settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Interface the API server binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port; `0` lets the OS pick one.
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
        }
    }
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    /// Whether the `/metrics` endpoint is served.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interface the metrics server binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port; `0` lets the OS pick one.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_metrics_port(),
        }
    }
}

/// Limits and timing of the in-memory subsystem manager.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SubsystemConfig {
    /// Maximum number of distinct pipelines.
    #[serde(default = "default_max_pipelines")]
    pub max_pipelines: usize,
    /// Maximum number of running sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Capacity of the subsystem event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Interval between registry status reports.
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,
}

impl Default for SubsystemConfig {
    fn default() -> Self {
        Self {
            max_pipelines: default_max_pipelines(),
            max_sessions: default_max_sessions(),
            event_buffer: default_event_buffer(),
            heartbeat_seconds: default_heartbeat_seconds(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_server_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    7300
}

fn default_max_pipelines() -> usize {
    32
}

fn default_max_sessions() -> usize {
    128
}

fn default_event_buffer() -> usize {
    256
}

fn default_heartbeat_seconds() -> u64 {
    60
}

fn default_shutdown_grace_seconds() -> u64 {
    10
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// JSON file with session requests bootstrapped at start-up.
    #[serde(default)]
    pub bootstrap_path: Option<PathBuf>,
    /// Policy for sessions started before a failing bootstrap request.
    #[serde(default)]
    pub on_partial_failure: PartialFailurePolicy,
    /// Upper bound on waiting for background tasks during shutdown.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// API server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Metrics exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Subsystem manager limits.
    #[serde(default)]
    pub subsystem: SubsystemConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            bootstrap_path: None,
            on_partial_failure: PartialFailurePolicy::default(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            server: ServerConfig::default(),
            metrics: MetricsConfig::default(),
            subsystem: SubsystemConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Socket address of the API server.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `server.host` is not an IP address.
    pub fn server_addr(&self) -> Result<SocketAddr> {
        socket_addr("server", &self.server.host, self.server.port)
    }

    /// Socket address of the metrics exporter.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `metrics.host` is not an IP address.
    pub fn metrics_addr(&self) -> Result<SocketAddr> {
        socket_addr("metrics", &self.metrics.host, self.metrics.port)
    }

    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Session requests preset in `bootstrap_path`, in file order.
    ///
    /// Returns an empty batch when no bootstrap file is configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be read and
    /// `AppError::Config` if it is not a JSON array of session requests.
    pub fn bootstrap_requests(&self) -> Result<Vec<SessionRequest>> {
        let Some(path) = self.bootstrap_path.as_deref() else {
            return Ok(Vec::new());
        };
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Io(format!("cannot read bootstrap file {}: {err}", path.display()))
        })?;
        let requests: Vec<SessionRequest> = serde_json::from_str(&raw)?;
        info!(count = requests.len(), path = %path.display(), "loaded bootstrap file");
        Ok(requests)
    }

    fn validate(&self) -> Result<()> {
        if self.subsystem.max_pipelines == 0 {
            return Err(AppError::Config(
                "subsystem.max_pipelines must be greater than zero".into(),
            ));
        }

        if self.subsystem.max_sessions == 0 {
            return Err(AppError::Config(
                "subsystem.max_sessions must be greater than zero".into(),
            ));
        }

        if self.subsystem.event_buffer == 0 {
            return Err(AppError::Config(
                "subsystem.event_buffer must be greater than zero".into(),
            ));
        }

        if self.subsystem.heartbeat_seconds == 0 {
            return Err(AppError::Config(
                "subsystem.heartbeat_seconds must be greater than zero".into(),
            ));
        }

        self.server_addr()?;
        if self.metrics.enabled {
            self.metrics_addr()?;
        }

        Ok(())
    }
}

fn socket_addr(section: &str, host: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = host
        .parse()
        .map_err(|err| AppError::Config(format!("{section}.host '{host}' invalid: {err}")))?;
    Ok(SocketAddr::new(ip, port))
}
