//! Database migrations for the attendance ledger.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_11_20_000001_create_employees;
mod m2025_11_20_000002_create_attendance_events;
mod m2025_11_20_000003_create_attendance_partitions;
mod m2025_11_20_000004_create_daily_status;
mod m2025_11_20_000005_create_sync_tasks;
mod m2025_11_20_000006_create_hr_health_checks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_11_20_000001_create_employees::Migration),
            Box::new(m2025_11_20_000002_create_attendance_events::Migration),
            Box::new(m2025_11_20_000003_create_attendance_partitions::Migration),
            Box::new(m2025_11_20_000004_create_daily_status::Migration),
            Box::new(m2025_11_20_000005_create_sync_tasks::Migration),
            Box::new(m2025_11_20_000006_create_hr_health_checks::Migration),
        ]
    }
}
