//! # Team Status Handler

use axum::{
    extract::rejection::{PathRejection, QueryRejection},
    extract::{Path, Query, State},
    response::Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::reporting::TeamMemberStatus;
use crate::server::AppState;

#[derive(Debug, Clone, Deserialize, Serialize, IntoParams)]
pub struct TeamStatusQuery {
    /// Business date (YYYY-MM-DD)
    #[param(value_type = String, format = Date)]
    pub date: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeamStatusResponse {
    pub manager_id: Uuid,
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub members: Vec<TeamMemberStatus>,
}

/// Daily status of everyone reporting to a manager, directly or indirectly
#[utoipa::path(
    get,
    path = "/managers/{manager_id}/team-status",
    security(("bearer_auth" = [])),
    params(("manager_id" = Uuid, Path, description = "Manager's employee identifier"), TeamStatusQuery),
    responses(
        (status = 200, description = "Team members ordered by name", body = TeamStatusResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown manager", body = ApiError)
    ),
    tag = "reporting"
)]
pub async fn team_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<TeamStatusQuery>, QueryRejection>,
) -> Result<Json<TeamStatusResponse>, ApiError> {
    let Path(manager_id) = path?;
    let Query(query) = query?;
    let members = state.reports.team_status(manager_id, query.date).await?;
    Ok(Json(TeamStatusResponse {
        manager_id,
        date: query.date,
        members,
    }))
}
