//! axum HTTP server exposing health, bootstrap and session listing routes.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info};

use super::{ApiServer, BootstrapAccepted, BootstrapBody, BootstrapRejected};
use crate::app::Bootstrapper;
use crate::errors::BootstrapError;
use crate::models::SessionSummary;
use crate::tasks::TaskScope;
use crate::{AppError, Result};

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Handler for `POST /v0/heuristic`.
async fn bootstrap_sessions(
    State(bootstrapper): State<Arc<Bootstrapper>>,
    Json(body): Json<BootstrapBody>,
) -> Response {
    // A started batch runs to completion even if the client goes away.
    let batch = tokio::spawn(async move { bootstrapper.bootstrap(&body.sessions).await });
    match batch.await {
        Ok(Ok(ids)) => (StatusCode::ACCEPTED, Json(BootstrapAccepted { ids })).into_response(),
        Ok(Err(err)) => (status_for(&err), Json(BootstrapRejected::from(&err))).into_response(),
        Err(err) => {
            error!(%err, "bootstrap task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "bootstrap task failed").into_response()
        }
    }
}

/// Handler for `GET /v0/sessions`.
async fn list_sessions(
    State(bootstrapper): State<Arc<Bootstrapper>>,
) -> Json<Vec<SessionSummary>> {
    Json(bootstrapper.sessions())
}

fn status_for(err: &BootstrapError) -> StatusCode {
    match err.source {
        AppError::Capacity(_) | AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Session(_) => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Build the API router over a shared bootstrapper.
pub fn router(bootstrapper: Arc<Bootstrapper>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v0/heuristic", post(bootstrap_sessions))
        .route("/v0/sessions", get(list_sessions))
        .with_state(bootstrapper)
}

/// HTTP implementation of [`ApiServer`].
pub struct HttpServer {
    addr: SocketAddr,
    bootstrapper: Arc<Bootstrapper>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl HttpServer {
    /// Server that will listen on `addr` once started.
    #[must_use]
    pub fn new(addr: SocketAddr, bootstrapper: Arc<Bootstrapper>) -> Self {
        Self {
            addr,
            bootstrapper,
            local_addr: Mutex::new(None),
        }
    }

    /// Address actually bound, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn serve(&self, scope: &TaskScope) -> Result<()> {
        let addr = self.addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| AppError::Start(format!("failed to bind API on {addr}: {err}")))?;
        let bound = listener
            .local_addr()
            .map_err(|err| AppError::Start(format!("API listener address: {err}")))?;
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(bound);

        info!(%bound, "starting API server");

        let router = router(Arc::clone(&self.bootstrapper));
        let ct = scope.token();
        scope.spawn("api_server", async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { ct.cancelled().await })
                .await;
            match result {
                Ok(()) => info!("API server shut down"),
                Err(err) => error!(%err, "API server failed"),
            }
        });

        Ok(())
    }
}

impl ApiServer for HttpServer {
    fn start<'a>(
        &'a self,
        scope: &'a TaskScope,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.serve(scope))
    }
}
