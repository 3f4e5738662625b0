//! HrHealthCheck entity model
//!
//! Persisted outcome of one reachability check against the HR ingestion endpoint.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "hr_health_checks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub checked_at: DateTimeWithTimeZone,

    /// Whether the canary log entry was accepted
    pub ingestion_ok: bool,

    /// Status the HR system answered with, absent when it was unreachable
    pub http_status: Option<i32>,

    pub latency_ms: i64,

    /// `{"kind": ..., "message": ..., "body": ...}` when the check failed
    #[sea_orm(column_type = "JsonBinary")]
    pub error_details: Option<JsonValue>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
