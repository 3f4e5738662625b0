//! # Data Models
//!
//! SeaORM entities for the attendance ledger and its satellites.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod attendance_event;
pub mod attendance_partition;
pub mod daily_status;
pub mod employee;
pub mod hr_health_check;
pub mod sync_task;

pub use attendance_event::{AttendanceEventType, Entity as AttendanceEvent, SyncStatus};
pub use attendance_partition::Entity as AttendancePartition;
pub use daily_status::Entity as DailyStatus;
pub use employee::Entity as Employee;
pub use hr_health_check::Entity as HrHealthCheck;
pub use sync_task::Entity as SyncTask;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "attendance-ledger".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
