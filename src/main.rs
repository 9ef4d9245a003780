#![forbid(unsafe_code)]

//! `heuristic-monitor` is the monitoring host binary.
//!
//! Loads configuration, starts the metrics exporter, the subsystem event
//! routines and the API server, bootstraps the preset session batch and
//! then parks until a termination signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use heuristic_monitor::api::{ApiServer, HttpServer};
use heuristic_monitor::metrics::{Metricer, Metrics};
use heuristic_monitor::subsystem::Manager;
use heuristic_monitor::{AppError, Application, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "heuristic-monitor", about = "Heuristic monitoring host", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// JSON file of session requests to bootstrap at start-up; overrides
    /// `bootstrap_path` from the configuration.
    #[arg(long)]
    bootstrap: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("heuristic-monitor bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(path) = args.bootstrap {
        config.bootstrap_path = Some(path);
    }
    let config = Arc::new(config);
    info!(policy = ?config.on_partial_failure, "configuration loaded");

    // ── Build collaborators ─────────────────────────────
    let metrics: Arc<dyn Metricer> = if config.metrics.enabled {
        Arc::new(Metrics::new(config.metrics_addr()?))
    } else {
        Arc::new(Metrics::disabled())
    };
    let subsystems = Arc::new(Manager::new(config.subsystem.clone()));
    let server_addr = config.server_addr()?;

    let app = Application::new(Arc::clone(&config), subsystems, metrics, |bootstrapper| {
        Box::new(HttpServer::new(server_addr, bootstrapper)) as Box<dyn ApiServer>
    });

    let presets = config.bootstrap_requests()?;

    // ── Start subsystems ────────────────────────────────
    app.start().await?;

    // ── Bootstrap preset sessions ───────────────────────
    if !presets.is_empty() {
        match app.bootstrap(&presets).await {
            Ok(ids) => info!(count = ids.len(), "preset sessions bootstrapped"),
            Err(err) => {
                error!(
                    index = err.index,
                    stage = %err.stage,
                    started = err.started.len(),
                    rolled_back = err.rolled_back.len(),
                    %err,
                    "preset session bootstrap failed"
                );
                app.request_stop();
                app.listen_for_shutdown(|| warn!("stopping after failed preset bootstrap"))
                    .await;
                return Err(err.into());
            }
        }
    }

    // ── Wait for shutdown signal ────────────────────────
    let signal = app
        .listen_for_shutdown(|| info!("cancelling background routines"))
        .await;
    info!(%signal, "heuristic-monitor shut down");

    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
