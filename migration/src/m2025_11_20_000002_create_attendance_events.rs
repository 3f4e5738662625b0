//! Migration to create the attendance_events ledger table.
//!
//! Rows are append-only. Sequence validity per (employee, business date) is enforced by
//! the ledger; the unique indexes below are the database backstop for racing appends.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AttendanceEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AttendanceEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AttendanceEvents::EmployeeId).uuid().not_null())
                    .col(ColumnDef::new(AttendanceEvents::EventType).text().not_null())
                    .col(
                        ColumnDef::new(AttendanceEvents::EventTimestampUtc)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttendanceEvents::BusinessDateLocal)
                            .date()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AttendanceEvents::Sequence).integer().not_null())
                    .col(ColumnDef::new(AttendanceEvents::Payload).json_binary().null())
                    .col(
                        ColumnDef::new(AttendanceEvents::SyncStatus)
                            .text()
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(AttendanceEvents::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AttendanceEvents::LastAttemptAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AttendanceEvents::SyncExhaustedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AttendanceEvents::SyncRequestBody)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AttendanceEvents::SyncResponseBody)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(AttendanceEvents::CreatedBy).text().not_null())
                    .col(
                        ColumnDef::new(AttendanceEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attendance_events_employee_id")
                            .from(AttendanceEvents::Table, AttendanceEvents::EmployeeId)
                            .to(Employees::Table, Employees::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attendance_events_partition_sequence")
                    .table(AttendanceEvents::Table)
                    .col(AttendanceEvents::EmployeeId)
                    .col(AttendanceEvents::BusinessDateLocal)
                    .col(AttendanceEvents::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attendance_events_sync_status")
                    .table(AttendanceEvents::Table)
                    .col(AttendanceEvents::SyncStatus)
                    .to_owned(),
            )
            .await?;

        // One CLOCK_IN per partition, even if two transactions race past validation.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_events_single_clock_in \
                 ON attendance_events (employee_id, business_date_local) \
                 WHERE event_type = 'CLOCK_IN'"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "DROP INDEX IF EXISTS idx_attendance_events_single_clock_in".to_string(),
            ))
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_attendance_events_sync_status")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_attendance_events_partition_sequence")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(AttendanceEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AttendanceEvents {
    Table,
    Id,
    EmployeeId,
    EventType,
    EventTimestampUtc,
    BusinessDateLocal,
    Sequence,
    Payload,
    SyncStatus,
    AttemptCount,
    LastAttemptAt,
    SyncExhaustedAt,
    SyncRequestBody,
    SyncResponseBody,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Employees {
    Table,
    Id,
}
