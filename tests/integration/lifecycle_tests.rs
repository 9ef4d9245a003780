//! End-to-end lifecycle against the real collaborators: in-memory subsystem
//! manager, metrics exporter and HTTP server on ephemeral ports.

use std::sync::Arc;
use std::time::Duration;

use heuristic_monitor::api::{ApiServer, HttpServer};
use heuristic_monitor::config::GlobalConfig;
use heuristic_monitor::metrics::{Metricer, Metrics};
use heuristic_monitor::subsystem::{Manager, SubsystemManager};
use heuristic_monitor::{AppError, Application, BootstrapStage, Lifecycle, TerminationSignal};

use super::test_helpers::{request, rollback_config, test_config};

struct Stack {
    app: Application,
    manager: Arc<Manager>,
    metrics: Arc<Metrics>,
}

fn stack(config: GlobalConfig) -> Stack {
    let manager = Arc::new(Manager::new(config.subsystem.clone()));
    let metrics = Arc::new(Metrics::new(config.metrics_addr().expect("metrics addr")));
    let server_addr = config.server_addr().expect("server addr");
    let app = Application::new(
        Arc::new(config),
        Arc::clone(&manager) as Arc<dyn SubsystemManager>,
        Arc::clone(&metrics) as Arc<dyn Metricer>,
        move |bootstrapper| {
            Box::new(HttpServer::new(server_addr, bootstrapper)) as Box<dyn ApiServer>
        },
    );
    Stack {
        app,
        manager,
        metrics,
    }
}

async fn wait_for_events(manager: &Manager, started: u64) {
    for _ in 0..100 {
        if manager.event_counters().sessions_started >= started {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("event loop did not observe {started} session starts");
}

#[tokio::test]
async fn start_bootstrap_and_programmatic_stop() {
    let Stack {
        app,
        manager,
        metrics,
    } = stack(test_config());

    app.start().await.expect("start");
    assert!(metrics.is_up());
    assert!(metrics.local_addr().is_some());

    let ids = app
        .bootstrap(&[request("a"), request("b")])
        .await
        .expect("bootstrap");
    assert_eq!(ids.len(), 2);
    assert_eq!(manager.sessions().len(), 2);
    wait_for_events(&manager, 2).await;

    app.request_stop();
    let signal = tokio::time::timeout(
        Duration::from_secs(5),
        app.listen_for_shutdown_on(std::future::pending(), || {}),
    )
    .await
    .expect("shutdown completes");

    assert_eq!(signal, TerminationSignal::Programmatic);
    assert_eq!(app.state(), Lifecycle::Stopped);
}

#[tokio::test]
async fn identical_pipeline_configs_share_a_pipeline_id() {
    let Stack { app, manager, .. } = stack(test_config());
    app.start().await.expect("start");

    let ids = app
        .bootstrap(&[request("a"), request("b")])
        .await
        .expect("bootstrap");

    assert_eq!(ids[0].pipeline_id, ids[1].pipeline_id);
    assert_ne!(ids[0].session_id, ids[1].session_id);
    assert_eq!(manager.pipeline_count(), 1);
}

#[tokio::test]
async fn duplicate_session_fails_at_run_session() {
    let Stack { app, manager, .. } = stack(test_config());
    app.start().await.expect("start");

    let err = app
        .bootstrap(&[request("a"), request("a")])
        .await
        .expect_err("duplicate rejected");

    assert_eq!(err.index, 1);
    assert_eq!(err.stage, BootstrapStage::RunSession);
    assert_eq!(err.started.len(), 1);
    assert_eq!(manager.sessions().len(), 1);
}

#[tokio::test]
async fn rollback_policy_retires_pipelines_on_failure() {
    let Stack { app, manager, .. } = stack(rollback_config());
    app.start().await.expect("start");

    let mut invalid = request("bad");
    invalid.end_height = Some(5);
    let err = app
        .bootstrap(&[request("a"), invalid])
        .await
        .expect_err("live request with end height rejected");

    assert_eq!(err.stage, BootstrapStage::PipelineConfig);
    assert_eq!(err.rolled_back.len(), 1);
    assert!(manager.sessions().is_empty());
    assert_eq!(manager.pipeline_count(), 0);
}

#[tokio::test]
async fn session_limit_surfaces_as_capacity_error() {
    let mut config = test_config();
    config.subsystem.max_sessions = 1;
    let Stack { app, .. } = stack(config);
    app.start().await.expect("start");

    let err = app
        .bootstrap(&[request("a"), request("b")])
        .await
        .expect_err("second session exceeds limit");

    assert_eq!(err.index, 1);
    assert!(matches!(err.source, AppError::Capacity(_)));
}

#[tokio::test]
async fn metrics_endpoint_reports_liveness() {
    let Stack { app, metrics, .. } = stack(test_config());
    app.start().await.expect("start");
    app.bootstrap(&[request("a")]).await.expect("bootstrap");

    let addr = metrics.local_addr().expect("metrics bound");
    let body = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .expect("GET /metrics")
        .text()
        .await
        .expect("body");

    assert!(body.contains("heuristic_monitor_up 1"), "{body}");
    assert!(body.contains("heuristic_monitor_sessions_active 1"), "{body}");
}
