//! # Integrity Audit Handler

use axum::{
    extract::rejection::QueryRejection,
    extract::{Query, State},
    response::Json,
};

use super::events::DateRangeQuery;
use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::reporting::IntegrityReport;
use crate::server::AppState;

/// Audits ledger integrity for a business-date range
///
/// Reports misfiled business dates, histories the sequence rules reject on replay and
/// breaks or lunches left open on past dates. Nothing is corrected.
#[utoipa::path(
    get,
    path = "/audit/integrity",
    security(("bearer_auth" = [])),
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Audit report", body = IntegrityReport),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "reporting"
)]
pub async fn integrity_audit(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    query: Result<Query<DateRangeQuery>, QueryRejection>,
) -> Result<Json<IntegrityReport>, ApiError> {
    let Query(range) = query?;
    let report = state.reports.integrity_audit(range.from, range.to).await?;
    Ok(Json(report))
}
