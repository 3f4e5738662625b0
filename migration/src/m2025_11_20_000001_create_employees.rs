//! Migration to create the employees table.
//!
//! Employees own attendance partitions. The table carries the identifier used by the
//! external HR system and the manager edge used to scope team queries.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Employees::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Employees::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Employees::FullName).text().not_null())
                    .col(ColumnDef::new(Employees::Email).text().null())
                    .col(
                        ColumnDef::new(Employees::ExternalAttendanceNumber)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(Employees::ManagerId).uuid().null())
                    .col(
                        ColumnDef::new(Employees::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_employees_manager_id")
                    .table(Employees::Table)
                    .col(Employees::ManagerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_employees_manager_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Employees::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Employees {
    Table,
    Id,
    FullName,
    Email,
    ExternalAttendanceNumber,
    ManagerId,
    CreatedAt,
}
