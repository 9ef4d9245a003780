//! Process-local metrics registry with an HTTP text exporter.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::routing::get;
use axum::Router;
use tracing::{debug, error, info};

use super::Metricer;
use crate::errors::BootstrapStage;
use crate::models::{HeuristicId, HeuristicType};
use crate::tasks::TaskScope;
use crate::{AppError, Result};

const NAMESPACE: &str = "heuristic_monitor";

#[derive(Debug, Default)]
struct Registry {
    up: AtomicBool,
    sessions_active: AtomicU64,
    sessions_started: Mutex<BTreeMap<&'static str, u64>>,
    bootstrap_failures: Mutex<BTreeMap<&'static str, u64>>,
}

impl Registry {
    fn bump(map: &Mutex<BTreeMap<&'static str, u64>>, label: &'static str) {
        let mut guard = map.lock().unwrap_or_else(PoisonError::into_inner);
        *guard.entry(label).or_insert(0) += 1;
    }

    fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "# HELP {NAMESPACE}_up Whether the process finished start-up."
        );
        let _ = writeln!(out, "# TYPE {NAMESPACE}_up gauge");
        let _ = writeln!(
            out,
            "{NAMESPACE}_up {}",
            u8::from(self.up.load(Ordering::SeqCst))
        );

        let _ = writeln!(
            out,
            "# HELP {NAMESPACE}_sessions_active Sessions currently running."
        );
        let _ = writeln!(out, "# TYPE {NAMESPACE}_sessions_active gauge");
        let _ = writeln!(
            out,
            "{NAMESPACE}_sessions_active {}",
            self.sessions_active.load(Ordering::SeqCst)
        );

        let _ = writeln!(
            out,
            "# HELP {NAMESPACE}_sessions_started_total Sessions started by bootstrap."
        );
        let _ = writeln!(out, "# TYPE {NAMESPACE}_sessions_started_total counter");
        for (heuristic, count) in self
            .sessions_started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            let _ = writeln!(
                out,
                "{NAMESPACE}_sessions_started_total{{heuristic=\"{heuristic}\"}} {count}"
            );
        }

        let _ = writeln!(
            out,
            "# HELP {NAMESPACE}_bootstrap_failures_total Bootstrap requests that failed."
        );
        let _ = writeln!(out, "# TYPE {NAMESPACE}_bootstrap_failures_total counter");
        for (stage, count) in self
            .bootstrap_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            let _ = writeln!(
                out,
                "{NAMESPACE}_bootstrap_failures_total{{stage=\"{stage}\"}} {count}"
            );
        }

        out
    }
}

/// Metrics registry served over HTTP.
///
/// When constructed with [`Metrics::disabled`] the counters are still kept
/// (and visible through [`Metrics::render`]) but no listener is bound.
#[derive(Debug)]
pub struct Metrics {
    addr: Option<SocketAddr>,
    registry: Arc<Registry>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Metrics {
    /// Registry exported on `addr` once started.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr: Some(addr),
            registry: Arc::default(),
            local_addr: Mutex::new(None),
        }
    }

    /// Registry that never binds a listener.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            addr: None,
            registry: Arc::default(),
            local_addr: Mutex::new(None),
        }
    }

    /// Address the exporter is listening on, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the liveness heartbeat has been recorded.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.registry.up.load(Ordering::SeqCst)
    }

    /// Current metrics in Prometheus text exposition format.
    #[must_use]
    pub fn render(&self) -> String {
        self.registry.render()
    }

    async fn serve(&self, addr: SocketAddr, scope: &TaskScope) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| AppError::Start(format!("failed to bind metrics on {addr}: {err}")))?;
        let bound = listener
            .local_addr()
            .map_err(|err| AppError::Start(format!("metrics listener address: {err}")))?;
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(bound);

        let registry = Arc::clone(&self.registry);
        let router = Router::new().route(
            "/metrics",
            get(move || {
                let registry = Arc::clone(&registry);
                async move { registry.render() }
            }),
        );

        info!(%bound, "starting metrics exporter");

        let ct = scope.token();
        scope.spawn("metrics_exporter", async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { ct.cancelled().await })
                .await;
            match result {
                Ok(()) => info!("metrics exporter shut down"),
                Err(err) => error!(%err, "metrics exporter failed"),
            }
        });

        Ok(())
    }
}

impl Metricer for Metrics {
    fn start<'a>(
        &'a self,
        scope: &'a TaskScope,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match self.addr {
                Some(addr) => self.serve(addr, scope).await,
                None => {
                    info!("metrics exporter disabled");
                    Ok(())
                }
            }
        })
    }

    fn record_up(&self) {
        self.registry.up.store(true, Ordering::SeqCst);
        info!("process up");
    }

    fn record_session_started(&self, id: &HeuristicId, heuristic: HeuristicType) {
        self.registry.sessions_active.fetch_add(1, Ordering::SeqCst);
        Registry::bump(&self.registry.sessions_started, heuristic.as_str());
        debug!(session_id = %id.session_id, heuristic = heuristic.as_str(), "session metric recorded");
    }

    fn record_session_stopped(&self, id: &HeuristicId) {
        let _ = self.registry.sessions_active.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |active| active.checked_sub(1),
        );
        debug!(session_id = %id.session_id, "session stop metric recorded");
    }

    fn record_bootstrap_failure(&self, stage: BootstrapStage) {
        Registry::bump(&self.registry.bootstrap_failures, stage.as_str());
    }
}
