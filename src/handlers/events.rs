//! # Attendance Event Handlers
//!
//! Clock-action intake and event listing for one employee.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, validation_error};
use crate::ledger::{ClockAction, RecordedEvent};
use crate::models::AttendanceEventType;
use crate::reporting::EventView;
use crate::server::AppState;

/// Actor recorded when the caller does not name one
const DEFAULT_ACTOR: &str = "operator";

/// Body of a clock action
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct RecordEventRequest {
    /// Kind of punch being recorded
    pub event_type: AttendanceEventType,
    /// Opaque metadata stored with the event; must be a JSON object when present
    #[schema(value_type = Option<Object>)]
    pub payload: Option<JsonValue>,
    /// Person or automated actor producing the event
    pub actor: Option<String>,
}

/// Inclusive business-date range
#[derive(Debug, Clone, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct DateRangeQuery {
    /// First business date (YYYY-MM-DD)
    #[param(value_type = String, format = Date)]
    #[schema(value_type = String, format = Date)]
    pub from: NaiveDate,
    /// Last business date (YYYY-MM-DD)
    #[param(value_type = String, format = Date)]
    #[schema(value_type = String, format = Date)]
    pub to: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    pub events: Vec<EventView>,
}

/// Records a clock action for an employee, stamped with the server's current time
#[utoipa::path(
    post,
    path = "/employees/{employee_id}/events",
    security(("bearer_auth" = [])),
    params(("employee_id" = Uuid, Path, description = "Employee identifier")),
    request_body = RecordEventRequest,
    responses(
        (status = 201, description = "Event recorded", body = RecordedEvent),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown employee", body = ApiError),
        (status = 409, description = "Already clocked in for the business date", body = ApiError),
        (status = 422, description = "Sequence violation", body = ApiError),
        (status = 503, description = "Partition busy, retry", body = ApiError)
    ),
    tag = "attendance"
)]
pub async fn record_event(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RecordEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RecordedEvent>), ApiError> {
    let Path(employee_id) = path?;
    let Json(request) = payload?;
    if let Some(payload) = &request.payload {
        if !payload.is_object() {
            return Err(validation_error(
                "Invalid payload",
                serde_json::json!({ "payload": "Must be a JSON object" }),
            ));
        }
    }

    let actor = match request.actor.as_deref().map(str::trim) {
        Some("") => {
            return Err(validation_error(
                "Invalid actor",
                serde_json::json!({ "actor": "Must not be blank" }),
            ));
        }
        Some(actor) => actor.to_string(),
        None => DEFAULT_ACTOR.to_string(),
    };

    let recorded = state
        .ledger
        .record(ClockAction {
            employee_id,
            event_type: request.event_type,
            payload: request.payload,
            actor,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(recorded)))
}

/// Lists an employee's events for a business-date range
#[utoipa::path(
    get,
    path = "/employees/{employee_id}/events",
    security(("bearer_auth" = [])),
    params(("employee_id" = Uuid, Path, description = "Employee identifier"), DateRangeQuery),
    responses(
        (status = 200, description = "Events ordered by timestamp", body = EventsResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "attendance"
)]
pub async fn list_events(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<DateRangeQuery>, QueryRejection>,
) -> Result<Json<EventsResponse>, ApiError> {
    let Path(employee_id) = path?;
    let Query(range) = query?;
    let events = state
        .reports
        .events(employee_id, range.from, range.to)
        .await?;
    Ok(Json(EventsResponse { events }))
}
