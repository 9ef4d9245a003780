#![forbid(unsafe_code)]

pub mod api;
pub mod app;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod subsystem;
pub mod tasks;

pub use app::{Application, Bootstrapper, Lifecycle, TerminationSignal};
pub use config::GlobalConfig;
pub use errors::{AppError, BootstrapError, BootstrapStage, Result};
