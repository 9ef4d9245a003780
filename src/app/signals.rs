//! Process termination signals.

use std::fmt::{Display, Formatter};

use tracing::warn;

/// Reason the application left its running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// Platform interrupt (SIGINT / Ctrl-C).
    Interrupt,
    /// Platform terminate request (SIGTERM).
    Terminate,
    /// Stop requested through [`Application::request_stop`](super::Application::request_stop).
    Programmatic,
}

impl TerminationSignal {
    /// Conventional signal name used in log records.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Programmatic => "programmatic",
        }
    }
}

impl Display for TerminationSignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Wait for the next interrupt or terminate signal delivered to the process.
///
/// If a handler cannot be installed the remaining one is still awaited; if
/// none can be installed the future never completes.
#[cfg(unix)]
pub async fn wait_for_termination() -> TerminationSignal {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            let interrupted = tokio::select! {
                result = ctrl_c => Some(result),
                _ = sigterm.recv() => None,
            };
            match interrupted {
                Some(Ok(())) => TerminationSignal::Interrupt,
                Some(Err(err)) => {
                    warn!(%err, "ctrl-c signal handler failed, waiting for SIGTERM only");
                    sigterm.recv().await;
                    TerminationSignal::Terminate
                }
                None => TerminationSignal::Terminate,
            }
        }
        Err(err) => {
            warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
            wait_for_ctrl_c(ctrl_c).await
        }
    }
}

/// Wait for the next Ctrl-C delivered to the process.
#[cfg(not(unix))]
pub async fn wait_for_termination() -> TerminationSignal {
    wait_for_ctrl_c(tokio::signal::ctrl_c()).await
}

async fn wait_for_ctrl_c(
    ctrl_c: impl std::future::Future<Output = std::io::Result<()>>,
) -> TerminationSignal {
    if let Err(err) = ctrl_c.await {
        tracing::error!(%err, "ctrl-c signal handler failed");
        std::future::pending::<()>().await;
    }
    TerminationSignal::Interrupt
}
