//! Migration to create the attendance_partitions table.
//!
//! One row per (employee, business date). Appends lock this row, so the first append of
//! a day is serialised even before any event exists. `sealed_at` records payroll close.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AttendancePartitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AttendancePartitions::EmployeeId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttendancePartitions::BusinessDateLocal)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttendancePartitions::SealedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(AttendancePartitions::SealedBy).text().null())
                    .col(
                        ColumnDef::new(AttendancePartitions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(AttendancePartitions::EmployeeId)
                            .col(AttendancePartitions::BusinessDateLocal),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attendance_partitions_employee_id")
                            .from(AttendancePartitions::Table, AttendancePartitions::EmployeeId)
                            .to(Employees::Table, Employees::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AttendancePartitions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AttendancePartitions {
    Table,
    EmployeeId,
    BusinessDateLocal,
    SealedAt,
    SealedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Employees {
    Table,
    Id,
}
