//! # Sync Handlers

use axum::{
    extract::rejection::PathRejection,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RetrySyncResponse {
    pub event_id: Uuid,
    pub sync_task_id: Uuid,
}

/// Re-enqueues delivery of an event whose sync was abandoned
#[utoipa::path(
    post,
    path = "/events/{event_id}/sync/retry",
    security(("bearer_auth" = [])),
    params(("event_id" = Uuid, Path, description = "Attendance event identifier")),
    responses(
        (status = 202, description = "Delivery re-enqueued", body = RetrySyncResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown event", body = ApiError),
        (status = 409, description = "Event is not in a terminal FAILED state", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn retry_sync(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<(StatusCode, Json<RetrySyncResponse>), ApiError> {
    let Path(event_id) = path?;
    let sync_task_id = state.pipeline.retry_event(event_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RetrySyncResponse {
            event_id,
            sync_task_id,
        }),
    ))
}
