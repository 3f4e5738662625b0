//! Migration to create the hr_health_checks table.
//!
//! One row per reachability check against the HR ingestion endpoint.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(HrHealthChecks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(HrHealthChecks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(HrHealthChecks::CheckedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(HrHealthChecks::IngestionOk)
                            .boolean()
                            .not_null(),
                    )
                    .col(ColumnDef::new(HrHealthChecks::HttpStatus).integer().null())
                    .col(
                        ColumnDef::new(HrHealthChecks::LatencyMs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(HrHealthChecks::ErrorDetails).json_binary().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_hr_health_checks_checked_at")
                    .table(HrHealthChecks::Table)
                    .col(HrHealthChecks::CheckedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_hr_health_checks_checked_at").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(HrHealthChecks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum HrHealthChecks {
    Table,
    Id,
    CheckedAt,
    IngestionOk,
    HttpStatus,
    LatencyMs,
    ErrorDetails,
}
