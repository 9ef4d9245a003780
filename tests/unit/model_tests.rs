use serde_json::json;

use heuristic_monitor::api::{BootstrapAccepted, BootstrapRejected};
use heuristic_monitor::models::{
    AlertDestination, DataType, HeuristicId, HeuristicType, PipelineId, SessionId, SessionRequest,
};
use heuristic_monitor::{AppError, BootstrapError, BootstrapStage};

#[test]
fn heuristic_id_serializes_both_halves() {
    let id = HeuristicId {
        session_id: SessionId::new(),
        pipeline_id: PipelineId::new(),
    };

    let value = serde_json::to_value(id).expect("serialize");

    assert_eq!(value["session_id"], id.session_id.to_string());
    assert_eq!(value["pipeline_id"], id.pipeline_id.to_string());
    assert_eq!(id.to_string(), format!("{}@{}", id.session_id, id.pipeline_id));
}

#[test]
fn request_defaults_optional_fields() {
    let request: SessionRequest = serde_json::from_value(json!({
        "network": "layer2",
        "pipeline_type": "live",
        "heuristic_type": "fault_detector"
    }))
    .expect("minimal request");

    assert_eq!(request.alert_destination, AlertDestination::Log);
    assert!(request.heuristic_params.is_empty());
    assert!(request.start_height.is_none());
}

#[test]
fn unknown_heuristic_type_is_rejected() {
    let result = serde_json::from_value::<SessionRequest>(json!({
        "network": "layer1",
        "pipeline_type": "live",
        "heuristic_type": "price_oracle"
    }));
    assert!(result.is_err());
}

#[test]
fn heuristic_types_map_to_pipeline_data() {
    assert_eq!(
        HeuristicType::BalanceEnforcement.input_type(),
        DataType::AccountBalance
    );
    for heuristic in [
        HeuristicType::ContractEvent,
        HeuristicType::WithdrawalSafety,
        HeuristicType::FaultDetector,
    ] {
        assert_eq!(heuristic.input_type(), DataType::EventLog);
        assert!(!heuristic.required_params().is_empty());
    }
}

#[test]
fn rejected_body_round_trips_stage_label() {
    let err = BootstrapError {
        index: 1,
        stage: BootstrapStage::RunSession,
        source: AppError::Session("duplicate".into()),
        started: Vec::new(),
        rolled_back: Vec::new(),
    };

    let body = BootstrapRejected::from(&err);
    let wire = serde_json::to_value(&body).expect("serialize");

    assert_eq!(wire["stage"], "run_session");
    assert_eq!(wire["error"], "session: duplicate");
    let parsed: BootstrapRejected = serde_json::from_value(wire).expect("deserialize");
    assert_eq!(parsed.stage(), Some(BootstrapStage::RunSession));
}

#[test]
fn accepted_body_lists_ids_in_order() {
    let ids: Vec<HeuristicId> = (0..3)
        .map(|_| HeuristicId {
            session_id: SessionId::new(),
            pipeline_id: PipelineId::new(),
        })
        .collect();

    let wire = serde_json::to_value(BootstrapAccepted { ids: ids.clone() }).expect("serialize");
    let parsed: BootstrapAccepted = serde_json::from_value(wire).expect("deserialize");

    assert_eq!(parsed.ids, ids);
}
