//! Domain model module declarations.

pub mod ids;
pub mod pipeline;
pub mod session;

pub use ids::{HeuristicId, PipelineId, SessionId};
pub use pipeline::{ClientConfig, DataType, DeploymentConfig, PipelineConfig};
pub use session::{
    AlertDestination, HeuristicType, Network, PipelineType, SessionConfig, SessionRequest,
    SessionSummary,
};
