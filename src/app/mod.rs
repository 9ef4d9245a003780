//! Application controller.
//!
//! Owns process start-up ordering, the bootstrap entry point and the
//! shutdown rendezvous. Subsystems are started in a fixed order:
//!
//! 1. metrics emitter, so every later component can report through it;
//! 2. subsystem event routines, which bootstrap delegates work to;
//! 3. API server, which may trigger bootstrap as soon as it accepts requests.
//!
//! The liveness heartbeat is recorded only after all three succeeded.

pub mod bootstrap;
pub mod signals;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use crate::api::ApiServer;
use crate::config::GlobalConfig;
use crate::errors::BootstrapError;
use crate::metrics::Metricer;
use crate::models::{HeuristicId, SessionRequest};
use crate::subsystem::SubsystemManager;
use crate::tasks::TaskScope;
use crate::{AppError, Result};

pub use bootstrap::Bootstrapper;
pub use signals::{wait_for_termination, TerminationSignal};

/// Lifecycle of the application instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built, nothing started yet.
    Constructed,
    /// Every subsystem is up.
    Started,
    /// A termination signal was received; teardown in progress.
    ShuttingDown,
    /// Teardown finished, or start-up failed.
    Stopped,
}

/// Process-wide application controller.
///
/// Built once in `main` and passed by reference (or `Arc`) to whatever
/// needs to bootstrap sessions.
pub struct Application {
    config: Arc<GlobalConfig>,
    metrics: Arc<dyn Metricer>,
    subsystems: Arc<dyn SubsystemManager>,
    server: Box<dyn ApiServer>,
    bootstrapper: Arc<Bootstrapper>,
    scope: TaskScope,
    stop: CancellationToken,
    start_attempted: AtomicBool,
    state: Mutex<Lifecycle>,
}

impl Application {
    /// Assemble the application from its collaborators.
    ///
    /// `server` receives the shared [`Bootstrapper`] so request handlers
    /// can submit sessions through the same protocol as the controller.
    pub fn new<F>(
        config: Arc<GlobalConfig>,
        subsystems: Arc<dyn SubsystemManager>,
        metrics: Arc<dyn Metricer>,
        server: F,
    ) -> Self
    where
        F: FnOnce(Arc<Bootstrapper>) -> Box<dyn ApiServer>,
    {
        let bootstrapper = Arc::new(Bootstrapper::new(
            Arc::clone(&subsystems),
            Arc::clone(&metrics),
            config.on_partial_failure,
        ));
        let server = server(Arc::clone(&bootstrapper));

        Self {
            config,
            metrics,
            subsystems,
            server,
            bootstrapper,
            scope: TaskScope::new(),
            stop: CancellationToken::new(),
            start_attempted: AtomicBool::new(false),
            state: Mutex::new(Lifecycle::Constructed),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> Lifecycle {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start metrics, subsystem event routines and the API server, in that
    /// order, then record the liveness heartbeat.
    ///
    /// Only the first call does anything. A failed start leaves the
    /// application [`Lifecycle::Stopped`]; the process is expected to exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Start` if the application was already started or
    /// if any subsystem fails to come up.
    pub async fn start(&self) -> Result<()> {
        if self.start_attempted.swap(true, Ordering::SeqCst) {
            return Err(AppError::Start("application already started".into()));
        }
        if self.state() != Lifecycle::Constructed {
            return Err(AppError::Start(format!(
                "cannot start from {:?}",
                self.state()
            )));
        }

        match self.start_subsystems().await {
            Ok(()) if self.transition(Lifecycle::Constructed, Lifecycle::Started) => {
                self.metrics.record_up();
                info!("application started");
                Ok(())
            }
            Ok(()) => {
                warn!(state = ?self.state(), "shutdown requested during start");
                self.scope.cancel();
                Err(AppError::Start("shutdown requested during start".into()))
            }
            Err(err) => {
                error!(%err, "application start failed");
                self.scope.cancel();
                self.transition(Lifecycle::Constructed, Lifecycle::Stopped);
                Err(err)
            }
        }
    }

    async fn start_subsystems(&self) -> Result<()> {
        self.metrics
            .start(&self.scope)
            .await
            .map_err(|err| start_error("metrics", err))?;
        info!("metrics emitter started");

        self.subsystems
            .start_event_routines(&self.scope)
            .map_err(|err| start_error("subsystem event routines", err))?;
        info!("subsystem event routines started");

        self.server
            .start(&self.scope)
            .await
            .map_err(|err| start_error("api server", err))?;
        info!("api server started");

        Ok(())
    }

    /// Bootstrap a batch of session requests.
    ///
    /// # Errors
    ///
    /// See [`Bootstrapper::bootstrap`].
    pub async fn bootstrap(
        &self,
        requests: &[SessionRequest],
    ) -> std::result::Result<Vec<HeuristicId>, BootstrapError> {
        self.bootstrapper.bootstrap(requests).await
    }

    /// Park until SIGINT/SIGTERM or [`request_stop`](Self::request_stop),
    /// then shut down, invoking `on_shutdown` once.
    pub async fn listen_for_shutdown<F>(&self, on_shutdown: F) -> TerminationSignal
    where
        F: FnOnce(),
    {
        self.listen_for_shutdown_on(wait_for_termination(), on_shutdown).await
    }

    /// Like [`listen_for_shutdown`](Self::listen_for_shutdown) but parks on
    /// `source` instead of the process signals.
    ///
    /// On the first signal the application moves to
    /// [`Lifecycle::ShuttingDown`], cancels every background task, invokes
    /// `on_shutdown`, waits up to `shutdown_grace_seconds` for tasks to
    /// drain and ends [`Lifecycle::Stopped`]. If the application is
    /// already shutting down or stopped the callback is not invoked.
    pub async fn listen_for_shutdown_on<S, F>(
        &self,
        source: S,
        on_shutdown: F,
    ) -> TerminationSignal
    where
        S: Future<Output = TerminationSignal>,
        F: FnOnce(),
    {
        let signal = tokio::select! {
            signal = source => signal,
            () = self.stop.cancelled() => TerminationSignal::Programmatic,
        };
        info!(signal = signal.name(), "received shutdown signal");

        if !self.begin_shutdown() {
            warn!(signal = signal.name(), "shutdown already handled; ignoring signal");
            return signal;
        }

        {
            let _guard = info_span!("shutdown", signal = signal.name()).entered();
            self.scope.cancel();
            on_shutdown();
        }

        if !self.scope.drain(self.config.shutdown_grace()).await {
            warn!(
                remaining = self.scope.active_tasks(),
                "background tasks did not finish within the shutdown grace period"
            );
        }

        self.set_state(Lifecycle::Stopped);
        info!("application stopped");
        signal
    }

    /// Single-slot source receiving the next termination event.
    ///
    /// The underlying process signals are shared, so each receiver sees at
    /// most one event and independent delivery to several subscribers is
    /// not guaranteed. The sender is dropped without a value if the
    /// application shuts down first. The watcher is a tracked task, so this
    /// must be called from within the tokio runtime.
    #[must_use]
    pub fn request_shutdown_channel(&self) -> oneshot::Receiver<TerminationSignal> {
        let (tx, rx) = oneshot::channel();
        let stop = self.stop.clone();
        let scope = self.scope.token();
        self.scope.spawn("shutdown_channel", async move {
            let signal = tokio::select! {
                signal = wait_for_termination() => signal,
                () = stop.cancelled() => TerminationSignal::Programmatic,
                () = scope.cancelled() => return,
            };
            let _ = tx.send(signal);
        });
        rx
    }

    /// Ask a parked [`listen_for_shutdown`](Self::listen_for_shutdown) to
    /// shut the application down.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    fn begin_shutdown(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            Lifecycle::Constructed | Lifecycle::Started => {
                *state = Lifecycle::ShuttingDown;
                true
            }
            Lifecycle::ShuttingDown | Lifecycle::Stopped => false,
        }
    }

    /// Move from `from` to `to` only if the state is still `from`.
    fn transition(&self, from: Lifecycle, to: Lifecycle) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn set_state(&self, next: Lifecycle) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

fn start_error(component: &str, err: AppError) -> AppError {
    match err {
        AppError::Start(msg) => AppError::Start(format!("{component}: {msg}")),
        other => AppError::Start(format!("{component}: {other}")),
    }
}
