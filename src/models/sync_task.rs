//! SyncTask entity model
//!
//! This module contains the SeaORM entity model for the sync_tasks table, the durable
//! queue of delivery work. A task references exactly one attendance event.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Task waiting for a worker
pub const STATUS_QUEUED: &str = "queued";
/// Task claimed by a worker
pub const STATUS_RUNNING: &str = "running";
/// Task given up on; kept for inspection
pub const STATUS_ABANDONED: &str = "abandoned";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Event this task delivers
    pub attendance_event_id: Uuid,

    /// Owner of the event, kept for notification fan-out when the event is gone
    pub employee_id: Uuid,

    /// queued, running or abandoned; completed tasks are deleted
    pub status: String,

    /// Number of times this task has been claimed
    pub attempts: i32,

    /// Earliest time the task may be claimed again
    pub run_after: DateTimeWithTimeZone,

    pub started_at: Option<DateTimeWithTimeZone>,

    /// Structured details of the last failure
    #[sea_orm(column_type = "JsonBinary")]
    pub last_error: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
