//! # Tests for Handlers

use axum::response::Json;
use serde_json::Value;
use utoipa::OpenApi;

use crate::handlers::events::{DateRangeQuery, RecordEventRequest};
use crate::handlers::root;
use crate::models::{AttendanceEventType, ServiceInfo};
use crate::server::ApiDoc;

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let Json(service_info) = root().await;

    assert_eq!(service_info.service, "attendance-ledger");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_root_handler_returns_valid_json() {
    let Json(service_info) = root().await;

    let json_value: Value =
        serde_json::to_value(&service_info).expect("Failed to serialize ServiceInfo");
    assert_eq!(json_value["service"], "attendance-ledger");
    assert!(json_value.get("version").is_some());
}

#[test]
fn test_service_info_default() {
    let service_info = ServiceInfo::default();
    assert_eq!(service_info.service, "attendance-ledger");
}

#[test]
fn record_event_request_accepts_screaming_event_types() {
    let request: RecordEventRequest = serde_json::from_value(serde_json::json!({
        "event_type": "BREAK_START",
        "payload": { "plan": "standup notes" }
    }))
    .unwrap();

    assert_eq!(request.event_type, AttendanceEventType::BreakStart);
    assert!(request.actor.is_none());
    assert_eq!(request.payload.unwrap()["plan"], "standup notes");
}

#[test]
fn record_event_request_rejects_unknown_event_type() {
    let result: Result<RecordEventRequest, _> =
        serde_json::from_value(serde_json::json!({ "event_type": "NAP_START" }));
    assert!(result.is_err());
}

#[test]
fn date_range_query_parses_iso_dates() {
    let range: DateRangeQuery =
        serde_json::from_value(serde_json::json!({ "from": "2025-11-01", "to": "2025-11-30" }))
            .unwrap();
    assert_eq!(range.from.to_string(), "2025-11-01");
    assert_eq!(range.to.to_string(), "2025-11-30");
}

#[test]
fn openapi_document_lists_every_route() {
    let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
    let paths = doc["paths"].as_object().unwrap();

    for path in [
        "/",
        "/healthz",
        "/employees/{employee_id}/events",
        "/employees/{employee_id}/daily-status",
        "/employees/{employee_id}/days/{date}/seal",
        "/managers/{manager_id}/team-status",
        "/audit/integrity",
        "/events/{event_id}/sync/retry",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
    assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
}
