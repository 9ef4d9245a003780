use std::error::Error;

use heuristic_monitor::models::{HeuristicId, PipelineId, SessionId};
use heuristic_monitor::{AppError, BootstrapError, BootstrapStage};

fn sample_id() -> HeuristicId {
    HeuristicId {
        session_id: SessionId::new(),
        pipeline_id: PipelineId::new(),
    }
}

#[test]
fn variants_display_with_kind_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Start("x".into()), "start: x"),
        (AppError::Pipeline("x".into()), "pipeline: x"),
        (AppError::Deploy("x".into()), "deploy: x"),
        (AppError::Session("x".into()), "session: x"),
        (AppError::Capacity("x".into()), "capacity: x"),
        (AppError::Unavailable("x".into()), "unavailable: x"),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::Api("x".into()), "api: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn bootstrap_error_names_index_stage_and_cause() {
    let err = BootstrapError {
        index: 2,
        stage: BootstrapStage::DeployConfig,
        source: AppError::Deploy("network mismatch".into()),
        started: vec![sample_id(), sample_id()],
        rolled_back: Vec::new(),
    };

    assert_eq!(
        err.to_string(),
        "request 2 failed at deploy_config: deploy: network mismatch"
    );
    let cause = err.source().expect("cause exposed");
    assert_eq!(cause.to_string(), "deploy: network mismatch");
}

#[test]
fn bootstrap_error_converts_into_app_error() {
    let err: AppError = BootstrapError {
        index: 0,
        stage: BootstrapStage::RunSession,
        source: AppError::Capacity("session limit of 1 reached".into()),
        started: Vec::new(),
        rolled_back: Vec::new(),
    }
    .into();

    assert!(matches!(err, AppError::Bootstrap(_)));
    assert!(err.to_string().starts_with("bootstrap: request 0 failed at run_session"));
}

#[test]
fn stage_labels_are_stable() {
    assert_eq!(BootstrapStage::PipelineConfig.as_str(), "pipeline_config");
    assert_eq!(BootstrapStage::DeployConfig.as_str(), "deploy_config");
    assert_eq!(BootstrapStage::RunSession.to_string(), "run_session");
}

#[test]
fn invalid_json_maps_to_config_error() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err = AppError::from(json_err);
    assert!(err.to_string().starts_with("config: invalid session request json"));
}
