//! DailyStatus entity model
//!
//! Overwritable projection, one row per (employee, business date). Never the source of
//! truth: every column is rebuilt from the partition's ledger rows.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "daily_status")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub employee_id: Uuid,

    #[sea_orm(primary_key, auto_increment = false)]
    pub business_date_local: Date,

    /// One of [`crate::projection::CurrentStatus`]
    pub current_status: String,

    pub break_minutes_used: i32,

    pub lunch_minutes_used: i32,

    pub is_late: bool,

    pub first_clock_in_utc: Option<DateTimeWithTimeZone>,

    pub last_event_type: Option<String>,

    pub last_event_timestamp_utc: Option<DateTimeWithTimeZone>,

    pub has_sync_errors: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
