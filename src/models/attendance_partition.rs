//! AttendancePartition entity model
//!
//! One row per (employee, business date). It is the lock target for appends and records
//! whether the date has been sealed (payroll close).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "attendance_partitions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub employee_id: Uuid,

    #[sea_orm(primary_key, auto_increment = false)]
    pub business_date_local: Date,

    pub sealed_at: Option<DateTimeWithTimeZone>,

    pub sealed_by: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_sealed(&self) -> bool {
        self.sealed_at.is_some()
    }
}
