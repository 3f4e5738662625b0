//! # API Handlers
//!
//! HTTP endpoint handlers for the attendance ledger API.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db;
use crate::error::{ApiError, ErrorType};
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod audit;
pub mod daily_status;
pub mod events;
pub mod sync;
pub mod team;

/// Liveness and database reachability
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Health check
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service and database are reachable", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    db::health_check(&state.db).await.map_err(|err| {
        tracing::warn!(error = %err, "Health check failed");
        ApiError::from(ErrorType::ServiceUnavailable)
    })?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        database: "ok".to_string(),
    }))
}

#[cfg(test)]
mod tests;
