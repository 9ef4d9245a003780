//! Session request model and its projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::{PipelineId, SessionId};
use super::pipeline::DataType;

/// Chain a session monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    /// Settlement layer.
    Layer1,
    /// Execution layer.
    Layer2,
}

/// How the pipeline consumes data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineType {
    /// Follow the chain head indefinitely.
    Live,
    /// Replay a bounded historical range.
    Backtest,
}

/// Monitored condition a session evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicType {
    /// Account balance must stay inside configured bounds.
    BalanceEnforcement,
    /// Alert on emission of specific contract events.
    ContractEvent,
    /// Detect unsafe withdrawal activity.
    WithdrawalSafety,
    /// Detect faulty output proposals.
    FaultDetector,
}

impl HeuristicType {
    /// Input data type the heuristic consumes.
    #[must_use]
    pub fn input_type(self) -> DataType {
        match self {
            Self::BalanceEnforcement => DataType::AccountBalance,
            Self::ContractEvent | Self::WithdrawalSafety | Self::FaultDetector => {
                DataType::EventLog
            }
        }
    }

    /// Parameter keys every request for this heuristic must carry.
    #[must_use]
    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::BalanceEnforcement => &["address"],
            Self::ContractEvent => &["address", "args"],
            Self::WithdrawalSafety => &["l1_portal_address", "l2_to_l1_address"],
            Self::FaultDetector => &["l2_output_address", "l2_to_l1_address"],
        }
    }

    /// Stable label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BalanceEnforcement => "balance_enforcement",
            Self::ContractEvent => "contract_event",
            Self::WithdrawalSafety => "withdrawal_safety",
            Self::FaultDetector => "fault_detector",
        }
    }
}

/// Where alerts raised by the session are routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertDestination {
    /// Structured log only.
    #[default]
    Log,
    /// Slack webhook.
    Slack,
    /// PagerDuty integration.
    PagerDuty,
}

/// User-supplied description of what to monitor and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionRequest {
    /// Chain to monitor.
    pub network: Network,
    /// Live or backtest.
    pub pipeline_type: PipelineType,
    /// Heuristic to evaluate.
    pub heuristic_type: HeuristicType,
    /// First block to read; `None` starts at the chain head.
    #[serde(default)]
    pub start_height: Option<u64>,
    /// Last block to read (backtests only).
    #[serde(default)]
    pub end_height: Option<u64>,
    /// Alert routing.
    #[serde(default)]
    pub alert_destination: AlertDestination,
    /// Heuristic-specific parameters.
    #[serde(default)]
    pub heuristic_params: Map<String, Value>,
}

impl SessionRequest {
    /// Session-specific half of the request, independent of the pipeline.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            network: self.network,
            pipeline_type: self.pipeline_type,
            heuristic_type: self.heuristic_type,
            alert_destination: self.alert_destination,
            params: self.heuristic_params.clone(),
        }
    }
}

/// Session parameters handed to the subsystem alongside a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Chain the session runs against.
    pub network: Network,
    /// Pipeline mode the session expects.
    pub pipeline_type: PipelineType,
    /// Heuristic the session evaluates.
    pub heuristic_type: HeuristicType,
    /// Alert routing.
    pub alert_destination: AlertDestination,
    /// Heuristic-specific parameters.
    pub params: Map<String, Value>,
}

/// Read-only view of a running session, exposed by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: SessionId,
    /// Pipeline the session is bound to.
    pub pipeline_id: PipelineId,
    /// Chain the session monitors.
    pub network: Network,
    /// Heuristic the session evaluates.
    pub heuristic_type: HeuristicType,
    /// Live or backtest.
    pub pipeline_type: PipelineType,
    /// Time the session was accepted.
    pub started_at: DateTime<Utc>,
}
