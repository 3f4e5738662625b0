//! Employee entity model
//!
//! Employees own attendance partitions. `external_attendance_number` is the identity the
//! external HR system knows them by; `manager_id` is the edge used by the manager hierarchy.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "employees")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub full_name: String,

    pub email: Option<String>,

    /// Identifier used by the external HR system; `None` means the employee cannot be synced
    pub external_attendance_number: Option<String>,

    pub manager_id: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
