//! Migration to create the sync_tasks table.
//!
//! Durable queue of delivery work keyed by attendance event id. There is deliberately no
//! foreign key to attendance_events: a task whose event is gone is dropped by the worker.

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
                    .table(SyncTasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncTasks::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncTasks::AttendanceEventId).uuid().not_null())
                    .col(ColumnDef::new(SyncTasks::EmployeeId).uuid().not_null())
                    .col(
                        ColumnDef::new(SyncTasks::Status)
                            .text()
                            .not_null()
                            .default("queued"),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::RunAfter)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncTasks::LastError).json_binary().null())
                    .col(
                        ColumnDef::new(SyncTasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Picking the next due task
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_sync_tasks_status_run_after ON sync_tasks (status, run_after)".to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_tasks_event_id")
                    .table(SyncTasks::Table)
                    .col(SyncTasks::AttendanceEventId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_sync_tasks_status_run_after").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_sync_tasks_event_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SyncTasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncTasks {
    Table,
    Id,
    AttendanceEventId,
    EmployeeId,
    Status,
    Attempts,
    RunAfter,
    StartedAt,
    LastError,
    CreatedAt,
    UpdatedAt,
}
