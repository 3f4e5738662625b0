//! Resolution of internal employee ids to the HR system's attendance numbers.

use std::fmt;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use uuid::Uuid;

use crate::models::employee;

/// Why an employee cannot be pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityGap {
    /// The employee row does not exist.
    EmployeeNotFound,
    /// The employee exists but has no external attendance number.
    MissingAttendanceNumber,
}

impl IdentityGap {
    pub fn code(&self) -> &'static str {
        match self {
            IdentityGap::EmployeeNotFound => "employee_not_found",
            IdentityGap::MissingAttendanceNumber => "missing_attendance_number",
        }
    }
}

impl fmt::Display for IdentityGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync + fmt::Debug {
    /// `Ok(Err(gap))` is a data problem and will not resolve on retry.
    async fn resolve(&self, employee_id: Uuid) -> Result<Result<String, IdentityGap>, DbErr>;
}

/// Reads `employees.external_attendance_number`.
#[derive(Debug, Clone)]
pub struct EmployeeTableResolver {
    db: DatabaseConnection,
}

impl EmployeeTableResolver {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityResolver for EmployeeTableResolver {
    async fn resolve(&self, employee_id: Uuid) -> Result<Result<String, IdentityGap>, DbErr> {
        let Some(employee) = employee::Entity::find_by_id(employee_id).one(&self.db).await? else {
            return Ok(Err(IdentityGap::EmployeeNotFound));
        };

        Ok(employee
            .external_attendance_number
            .map(|number| number.trim().to_string())
            .filter(|number| !number.is_empty())
            .ok_or(IdentityGap::MissingAttendanceNumber))
    }
}
