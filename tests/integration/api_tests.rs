//! HTTP API tests: a real listener on an ephemeral port backed by the
//! in-memory subsystem manager.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use heuristic_monitor::api::{ApiServer, BootstrapAccepted, BootstrapRejected, HttpServer};
use heuristic_monitor::config::PartialFailurePolicy;
use heuristic_monitor::metrics::Metrics;
use heuristic_monitor::subsystem::{Manager, SubsystemManager};
use heuristic_monitor::tasks::TaskScope;
use heuristic_monitor::{BootstrapStage, Bootstrapper};

use super::test_helpers::{call_log, request, test_config, RecordingSubsystem};

async fn serve() -> (SocketAddr, TaskScope) {
    let config = test_config();
    serve_with(Arc::new(Manager::new(config.subsystem.clone()))).await
}

async fn serve_with(subsystems: Arc<dyn SubsystemManager>) -> (SocketAddr, TaskScope) {
    let bootstrapper = Arc::new(Bootstrapper::new(
        subsystems,
        Arc::new(Metrics::disabled()),
        PartialFailurePolicy::KeepStarted,
    ));
    let server = HttpServer::new(
        "127.0.0.1:0".parse().expect("addr"),
        Arc::clone(&bootstrapper),
    );
    let scope = TaskScope::new();
    server.start(&scope).await.expect("server starts");
    let addr = server.local_addr().expect("bound address");
    (addr, scope)
}

fn balance(address: &str) -> Value {
    json!({
        "network": "layer1",
        "pipeline_type": "live",
        "heuristic_type": "balance_enforcement",
        "heuristic_params": { "address": address, "lower": 1 }
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let (addr, scope) = serve().await;

    let resp = reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("GET /health");

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "ok");
    scope.cancel();
}

#[tokio::test]
async fn accepted_batch_returns_ids_and_lists_sessions() {
    let (addr, scope) = serve().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/v0/heuristic"))
        .json(&json!({ "sessions": [balance("0x1"), balance("0x2")] }))
        .send()
        .await
        .expect("POST /v0/heuristic");
    assert_eq!(resp.status(), 202);
    let accepted: BootstrapAccepted = resp.json().await.expect("accepted body");
    assert_eq!(accepted.ids.len(), 2);

    let sessions: Value = client
        .get(format!("http://{addr}/v0/sessions"))
        .send()
        .await
        .expect("GET /v0/sessions")
        .json()
        .await
        .expect("sessions body");
    let listed = sessions.as_array().expect("array");
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|s| s["heuristic_type"] == "balance_enforcement"));
    scope.cancel();
}

#[tokio::test]
async fn invalid_request_is_rejected_with_stage_and_index() {
    let (addr, scope) = serve().await;

    let missing_address = json!({
        "network": "layer1",
        "pipeline_type": "live",
        "heuristic_type": "balance_enforcement"
    });
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/v0/heuristic"))
        .json(&json!({ "sessions": [balance("0x1"), missing_address] }))
        .send()
        .await
        .expect("POST /v0/heuristic");

    assert_eq!(resp.status(), 400);
    let rejected: BootstrapRejected = resp.json().await.expect("rejected body");
    assert_eq!(rejected.index, 1);
    assert_eq!(rejected.stage(), Some(BootstrapStage::PipelineConfig));
    assert_eq!(rejected.started.len(), 1);
    assert!(rejected.error.contains("address"), "{}", rejected.error);
    scope.cancel();
}

#[tokio::test]
async fn duplicate_session_conflicts() {
    let (addr, scope) = serve().await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/v0/heuristic");

    let first = client
        .post(&url)
        .json(&json!({ "sessions": [balance("0x1")] }))
        .send()
        .await
        .expect("first POST");
    assert_eq!(first.status(), 202);

    let second = client
        .post(&url)
        .json(&json!({ "sessions": [balance("0x1")] }))
        .send()
        .await
        .expect("second POST");
    assert_eq!(second.status(), 409);
    let rejected: BootstrapRejected = second.json().await.expect("rejected body");
    assert_eq!(rejected.stage(), Some(BootstrapStage::RunSession));
    scope.cancel();
}

#[tokio::test]
async fn server_stops_when_scope_drains() {
    let (addr, scope) = serve().await;

    scope.cancel();
    assert!(scope.drain(Duration::from_secs(2)).await);

    let result = reqwest::get(format!("http://{addr}/health")).await;
    assert!(result.is_err(), "listener should be closed");
}

#[tokio::test]
async fn stopped_event_loop_is_service_unavailable() {
    let config = test_config();
    let manager = Arc::new(Manager::new(config.subsystem.clone()));
    let routines = TaskScope::new();
    manager
        .start_event_routines(&routines)
        .expect("routines start");
    routines.cancel();
    assert!(routines.drain(Duration::from_secs(2)).await);

    let (addr, scope) = serve_with(manager).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/v0/heuristic"))
        .json(&json!({ "sessions": [balance("0x1")] }))
        .send()
        .await
        .expect("POST /v0/heuristic");

    assert_eq!(resp.status(), 503);
    let rejected: BootstrapRejected = resp.json().await.expect("rejected body");
    assert!(rejected.error.starts_with("unavailable:"), "{}", rejected.error);
    scope.cancel();
}

#[tokio::test]
async fn client_disconnect_does_not_cut_batch_short() {
    let log = call_log();
    let subsystems = Arc::new(RecordingSubsystem {
        run_delay: Some(Duration::from_millis(100)),
        ..RecordingSubsystem::new(&log)
    });
    let (addr, scope) = serve_with(Arc::clone(&subsystems) as Arc<dyn SubsystemManager>).await;

    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(150))
        .build()
        .expect("client");
    let body = json!({ "sessions": [request("a"), request("b"), request("c")] });
    let result = impatient
        .post(format!("http://{addr}/v0/heuristic"))
        .json(&body)
        .send()
        .await;
    assert!(result.is_err(), "client gives up before the batch finishes");

    for _ in 0..100 {
        if subsystems.issued().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let tags: Vec<String> = subsystems.issued().into_iter().map(|s| s.tag).collect();
    assert_eq!(tags, vec!["a", "b", "c"]);
    scope.cancel();
}
