//! Migration to create the daily_status projection table.
//!
//! Rows are overwritten on every recompute and can always be rebuilt from the ledger.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DailyStatus::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DailyStatus::EmployeeId).uuid().not_null())
                    .col(
                        ColumnDef::new(DailyStatus::BusinessDateLocal)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DailyStatus::CurrentStatus)
                            .text()
                            .not_null()
                            .default("OFF_DUTY"),
                    )
                    .col(
                        ColumnDef::new(DailyStatus::BreakMinutesUsed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyStatus::LunchMinutesUsed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyStatus::IsLate)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DailyStatus::FirstClockInUtc)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(DailyStatus::LastEventType).text().null())
                    .col(
                        ColumnDef::new(DailyStatus::LastEventTimestampUtc)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DailyStatus::HasSyncErrors)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .primary_key(
                        Index::create()
                            .col(DailyStatus::EmployeeId)
                            .col(DailyStatus::BusinessDateLocal),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DailyStatus::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DailyStatus {
    Table,
    EmployeeId,
    BusinessDateLocal,
    CurrentStatus,
    BreakMinutesUsed,
    LunchMinutesUsed,
    IsLate,
    FirstClockInUtc,
    LastEventType,
    LastEventTimestampUtc,
    HasSyncErrors,
}
