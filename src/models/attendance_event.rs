//! AttendanceEvent entity model
//!
//! This module contains the SeaORM entity model for the append-only attendance_events
//! ledger together with the typed event and sync status vocabularies stored in it.

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// A committed attendance event.
///
/// Only the sync bookkeeping columns (`sync_status`, `attempt_count`, `last_attempt_at`,
/// `sync_exhausted_at` and the request/response bodies) change after insert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "attendance_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub employee_id: Uuid,

    /// One of [`AttendanceEventType`], stored as its SCREAMING_SNAKE_CASE name
    pub event_type: String,

    pub event_timestamp_utc: DateTimeWithTimeZone,

    /// Local calendar date derived from `event_timestamp_utc`
    pub business_date_local: Date,

    /// Position of the event inside its partition, starting at 1
    pub sequence: i32,

    /// Opaque caller metadata; never inspected by the ledger
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Option<JsonValue>,

    /// One of [`SyncStatus`]
    pub sync_status: String,

    pub attempt_count: i32,

    pub last_attempt_at: Option<DateTimeWithTimeZone>,

    /// Set when delivery was given up; the FAILED status is then terminal
    pub sync_exhausted_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "JsonBinary")]
    pub sync_request_body: Option<JsonValue>,

    #[sea_orm(column_type = "JsonBinary")]
    pub sync_response_body: Option<JsonValue>,

    /// Actor that produced the event (a person or an automated actor)
    pub created_by: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::employee::Entity",
        from = "Column::EmployeeId",
        to = "super::employee::Column::Id"
    )]
    Employee,
}

impl Related<super::employee::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Employee.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parsed event type. Rows are only ever written from the typed enum.
    pub fn kind(&self) -> Result<AttendanceEventType, UnknownVariant> {
        self.event_type.parse()
    }

    /// Parsed sync status.
    pub fn status(&self) -> Result<SyncStatus, UnknownVariant> {
        self.sync_status.parse()
    }
}

/// Returned when a stored string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Kinds of punches an employee can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceEventType {
    ClockIn,
    ClockOut,
    BreakStart,
    BreakEnd,
    LunchStart,
    LunchEnd,
}

impl AttendanceEventType {
    pub const ALL: [AttendanceEventType; 6] = [
        AttendanceEventType::ClockIn,
        AttendanceEventType::ClockOut,
        AttendanceEventType::BreakStart,
        AttendanceEventType::BreakEnd,
        AttendanceEventType::LunchStart,
        AttendanceEventType::LunchEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceEventType::ClockIn => "CLOCK_IN",
            AttendanceEventType::ClockOut => "CLOCK_OUT",
            AttendanceEventType::BreakStart => "BREAK_START",
            AttendanceEventType::BreakEnd => "BREAK_END",
            AttendanceEventType::LunchStart => "LUNCH_START",
            AttendanceEventType::LunchEnd => "LUNCH_END",
        }
    }
}

impl fmt::Display for AttendanceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceEventType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AttendanceEventType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownVariant {
                kind: "event type",
                value: value.to_string(),
            })
    }
}

/// Delivery state of an event towards the external HR system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Processing => "PROCESSING",
            SyncStatus::Success => "SUCCESS",
            SyncStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(SyncStatus::Pending),
            "PROCESSING" => Ok(SyncStatus::Processing),
            "SUCCESS" => Ok(SyncStatus::Success),
            "FAILED" => Ok(SyncStatus::Failed),
            other => Err(UnknownVariant {
                kind: "sync status",
                value: other.to_string(),
            }),
        }
    }
}
