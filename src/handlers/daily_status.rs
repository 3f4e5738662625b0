//! # Daily Status Handlers

use axum::{
    extract::rejection::{PathRejection, QueryRejection},
    extract::{Path, Query, State},
    response::Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::events::DateRangeQuery;
use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::projection::DailyStatusSnapshot;
use crate::server::AppState;

/// Actor recorded on seals made through the API
const SEAL_ACTOR: &str = "operator";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DailyStatusResponse {
    pub daily_statuses: Vec<DailyStatusSnapshot>,
}

/// Lists an employee's daily statuses for a business-date range
#[utoipa::path(
    get,
    path = "/employees/{employee_id}/daily-status",
    security(("bearer_auth" = [])),
    params(("employee_id" = Uuid, Path, description = "Employee identifier"), DateRangeQuery),
    responses(
        (status = 200, description = "Daily statuses ordered by date", body = DailyStatusResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "attendance"
)]
pub async fn list_daily_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<DateRangeQuery>, QueryRejection>,
) -> Result<Json<DailyStatusResponse>, ApiError> {
    let Path(employee_id) = path?;
    let Query(range) = query?;
    let daily_statuses = state
        .reports
        .daily_statuses(employee_id, range.from, range.to)
        .await?;
    Ok(Json(DailyStatusResponse { daily_statuses }))
}

/// Seals a business date for an employee (payroll close)
///
/// Later clock actions for the date are rejected with `PARTITION_SEALED`. Sealing twice is
/// harmless.
#[utoipa::path(
    post,
    path = "/employees/{employee_id}/days/{date}/seal",
    security(("bearer_auth" = [])),
    params(
        ("employee_id" = Uuid, Path, description = "Employee identifier"),
        ("date" = String, Path, format = Date, description = "Business date (YYYY-MM-DD)")
    ),
    responses(
        (status = 200, description = "Date sealed; status is LOCKED", body = DailyStatusSnapshot),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown employee", body = ApiError)
    ),
    tag = "attendance"
)]
pub async fn seal_day(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<(Uuid, NaiveDate)>, PathRejection>,
) -> Result<Json<DailyStatusSnapshot>, ApiError> {
    let Path((employee_id, date)) = path?;
    let snapshot = state
        .ledger
        .seal_partition(employee_id, date, SEAL_ACTOR)
        .await?;
    Ok(Json(snapshot))
}
