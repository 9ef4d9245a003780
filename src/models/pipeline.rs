//! Pipeline and deployment configuration artifacts.
//!
//! A [`PipelineConfig`] describes the topology a request needs, independent
//! of who asked for it. A [`DeploymentConfig`] binds that topology to one
//! session and carries the [`PipelineId`] the subsystem assigned.

use serde::{Deserialize, Serialize};

use super::ids::PipelineId;
use super::session::{Network, PipelineType, SessionConfig};

/// Kind of data a pipeline feeds into its heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Polled account balances.
    AccountBalance,
    /// Filtered event logs.
    EventLog,
}

/// Block-range parameters of the chain client feeding the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientConfig {
    /// First block to read; `None` starts at the chain head.
    pub start_height: Option<u64>,
    /// Last block to read; `None` for live pipelines.
    pub end_height: Option<u64>,
}

/// Pipeline topology derived from a session request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Chain the pipeline reads from.
    pub network: Network,
    /// Data the pipeline produces.
    pub data_type: DataType,
    /// Live or backtest.
    pub pipeline_type: PipelineType,
    /// Chain client parameters.
    pub client: ClientConfig,
}

/// Unit handed to the subsystem manager to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Pipeline assigned when the deployment was built.
    pub pipeline_id: PipelineId,
    /// Pipeline topology.
    pub pipeline: PipelineConfig,
    /// Session-specific parameters.
    pub session: SessionConfig,
}
