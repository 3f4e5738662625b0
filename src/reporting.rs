//! # Reporting
//!
//! Read-only queries over the ledger and the daily status projection, and the integrity
//! audit. Date ranges are inclusive business dates and are turned into UTC bounds with the
//! same [`BusinessCalendar`] the write path uses.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::business_date::BusinessCalendar;
use crate::clock::Clock;
use crate::hierarchy::ManagerHierarchy;
use crate::ledger::{PartitionState, replay};
use crate::models::attendance_event::{self, UnknownVariant};
use crate::models::{AttendanceEventType, SyncStatus, daily_status, employee};
use crate::projection::DailyStatusSnapshot;

/// Longest range a single report may span.
pub const MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("range start {from} is after range end {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
    #[error("range spans more than {MAX_RANGE_DAYS} days")]
    RangeTooLong,
    #[error("employee {0} does not exist")]
    UnknownEmployee(Uuid),
    #[error(transparent)]
    Corrupt(#[from] UnknownVariant),
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// An attendance event as exposed to readers.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EventView {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub event_type: AttendanceEventType,
    #[schema(value_type = String, format = DateTime)]
    pub event_timestamp_utc: DateTime<Utc>,
    #[schema(value_type = String, format = Date)]
    pub business_date_local: NaiveDate,
    pub sequence: i32,
    #[schema(value_type = Option<Object>)]
    pub payload: Option<JsonValue>,
    pub sync_status: SyncStatus,
    pub attempt_count: i32,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub sync_exhausted_at: Option<DateTime<Utc>>,
    pub created_by: String,
}

impl TryFrom<attendance_event::Model> for EventView {
    type Error = UnknownVariant;

    fn try_from(row: attendance_event::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            event_type: row.kind()?,
            sync_status: row.status()?,
            id: row.id,
            employee_id: row.employee_id,
            event_timestamp_utc: row.event_timestamp_utc.with_timezone(&Utc),
            business_date_local: row.business_date_local,
            sequence: row.sequence,
            payload: row.payload,
            attempt_count: row.attempt_count,
            last_attempt_at: row.last_attempt_at.map(|ts| ts.with_timezone(&Utc)),
            sync_exhausted_at: row.sync_exhausted_at.map(|ts| ts.with_timezone(&Utc)),
            created_by: row.created_by,
        })
    }
}

/// Status of one report of a manager for one date.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TeamMemberStatus {
    pub employee_id: Uuid,
    pub full_name: String,
    /// `None` when the employee has no events on the date
    pub daily_status: Option<DailyStatusSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalKind {
    Break,
    Lunch,
}

/// One integrity problem. Findings are reported only; nothing is corrected.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityFinding {
    /// Stored business date disagrees with the date derived from the timestamp.
    BusinessDateMismatch {
        event_id: Uuid,
        employee_id: Uuid,
        #[schema(value_type = String, format = Date)]
        stored: NaiveDate,
        #[schema(value_type = String, format = Date)]
        derived: NaiveDate,
    },
    /// The partition's history is rejected when replayed from empty state.
    SequenceRejected {
        employee_id: Uuid,
        #[schema(value_type = String, format = Date)]
        business_date_local: NaiveDate,
        event_id: Uuid,
        event_type: AttendanceEventType,
        violation: String,
        message: String,
    },
    /// A break or lunch was never ended on a business date that is over.
    OpenInterval {
        employee_id: Uuid,
        #[schema(value_type = String, format = Date)]
        business_date_local: NaiveDate,
        interval: IntervalKind,
    },
    /// A stored row names an unknown event type or sync status.
    UnreadableEvent {
        event_id: Uuid,
        employee_id: Uuid,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct IntegrityReport {
    #[schema(value_type = String, format = Date)]
    pub from: NaiveDate,
    #[schema(value_type = String, format = Date)]
    pub to: NaiveDate,
    pub partitions_checked: usize,
    pub events_checked: usize,
    pub findings: Vec<IntegrityFinding>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Read side of the ledger.
#[derive(Debug, Clone)]
pub struct AttendanceReports {
    db: DatabaseConnection,
    calendar: BusinessCalendar,
    clock: Arc<dyn Clock>,
}

impl AttendanceReports {
    pub fn new(db: DatabaseConnection, calendar: BusinessCalendar, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            calendar,
            clock,
        }
    }

    /// Events of an employee whose timestamps fall on business dates `from..=to`.
    pub async fn events(
        &self,
        employee_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<EventView>, ReportError> {
        check_range(from, to)?;
        let (start, end) = self.calendar.utc_range(from, to);

        let rows = attendance_event::Entity::find()
            .filter(attendance_event::Column::EmployeeId.eq(employee_id))
            .filter(attendance_event::Column::EventTimestampUtc.gte(start))
            .filter(attendance_event::Column::EventTimestampUtc.lt(end))
            .order_by_asc(attendance_event::Column::EventTimestampUtc)
            .order_by_asc(attendance_event::Column::Sequence)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(EventView::try_from)
            .collect::<Result<Vec<_>, UnknownVariant>>()?)
    }

    /// Stored daily statuses of an employee for business dates `from..=to`.
    pub async fn daily_statuses(
        &self,
        employee_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyStatusSnapshot>, ReportError> {
        check_range(from, to)?;

        let rows = daily_status::Entity::find()
            .filter(daily_status::Column::EmployeeId.eq(employee_id))
            .filter(daily_status::Column::BusinessDateLocal.between(from, to))
            .order_by_asc(daily_status::Column::BusinessDateLocal)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(DailyStatusSnapshot::try_from)
            .collect::<Result<Vec<_>, UnknownVariant>>()?)
    }

    /// Daily status of every direct and indirect report of `manager_id` on `date`.
    pub async fn team_status(
        &self,
        manager_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TeamMemberStatus>, ReportError> {
        if employee::Entity::find_by_id(manager_id)
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(ReportError::UnknownEmployee(manager_id));
        }

        let hierarchy = ManagerHierarchy::load(&self.db).await?;
        let reports = hierarchy.all_reports(manager_id);
        if reports.is_empty() {
            return Ok(Vec::new());
        }

        let employees = employee::Entity::find()
            .filter(employee::Column::Id.is_in(reports.clone()))
            .order_by_asc(employee::Column::FullName)
            .all(&self.db)
            .await?;

        let mut statuses: BTreeMap<Uuid, DailyStatusSnapshot> = BTreeMap::new();
        for row in daily_status::Entity::find()
            .filter(daily_status::Column::EmployeeId.is_in(reports))
            .filter(daily_status::Column::BusinessDateLocal.eq(date))
            .all(&self.db)
            .await?
        {
            statuses.insert(row.employee_id, DailyStatusSnapshot::try_from(row)?);
        }

        Ok(employees
            .into_iter()
            .map(|member| TeamMemberStatus {
                daily_status: statuses.remove(&member.id),
                employee_id: member.id,
                full_name: member.full_name,
            })
            .collect())
    }

    /// Checks every partition touching business dates `from..=to`.
    pub async fn integrity_audit(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<IntegrityReport, ReportError> {
        check_range(from, to)?;
        let (start, end) = self.calendar.utc_range(from, to);

        // Rows are selected by stored date or by timestamp so that misfiled rows on
        // either side of the range are seen.
        let rows = attendance_event::Entity::find()
            .filter(
                Condition::any()
                    .add(attendance_event::Column::BusinessDateLocal.between(from, to))
                    .add(
                        Condition::all()
                            .add(attendance_event::Column::EventTimestampUtc.gte(start))
                            .add(attendance_event::Column::EventTimestampUtc.lt(end)),
                    ),
            )
            .all(&self.db)
            .await?;
        let rows = self.complete_partitions(rows, from, to).await?;

        let today = self.calendar.business_date(self.clock.now());
        let events_checked = rows.len();
        let mut findings = Vec::new();
        let mut partitions: BTreeMap<(Uuid, NaiveDate), Vec<(Uuid, AttendanceEventType, DateTime<Utc>)>> =
            BTreeMap::new();

        for row in rows {
            let timestamp = row.event_timestamp_utc.with_timezone(&Utc);
            let derived = self.calendar.business_date(timestamp);
            if derived != row.business_date_local {
                findings.push(IntegrityFinding::BusinessDateMismatch {
                    event_id: row.id,
                    employee_id: row.employee_id,
                    stored: row.business_date_local,
                    derived,
                });
            }

            match row.kind() {
                Ok(kind) => partitions
                    .entry((row.employee_id, row.business_date_local))
                    .or_default()
                    .push((row.id, kind, timestamp)),
                Err(err) => findings.push(IntegrityFinding::UnreadableEvent {
                    event_id: row.id,
                    employee_id: row.employee_id,
                    message: err.to_string(),
                }),
            }
        }

        let partitions_checked = partitions.len();
        for ((employee_id, business_date_local), events) in partitions {
            let history = events.iter().map(|(_, kind, ts)| (*kind, *ts));
            let state = match replay(history) {
                Ok(state) => state,
                Err(failure) => {
                    findings.push(IntegrityFinding::SequenceRejected {
                        employee_id,
                        business_date_local,
                        event_id: events[failure.index].0,
                        event_type: failure.event_type,
                        violation: failure.violation.code().to_string(),
                        message: failure.violation.to_string(),
                    });
                    PartitionState::fold(events.iter().map(|(_, kind, ts)| (*kind, *ts)))
                }
            };

            if business_date_local < today {
                if state.has_open_break {
                    findings.push(IntegrityFinding::OpenInterval {
                        employee_id,
                        business_date_local,
                        interval: IntervalKind::Break,
                    });
                }
                if state.has_open_lunch {
                    findings.push(IntegrityFinding::OpenInterval {
                        employee_id,
                        business_date_local,
                        interval: IntervalKind::Lunch,
                    });
                }
            }
        }

        if findings.is_empty() {
            info!(%from, %to, partitions_checked, "Integrity audit found no problems");
        } else {
            warn!(%from, %to, findings = findings.len(), "Integrity audit found problems");
        }

        Ok(IntegrityReport {
            from,
            to,
            partitions_checked,
            events_checked,
            findings,
        })
    }

    /// Partitions filed outside `from..=to` are reached only through their misfiled rows;
    /// loads the rest of each so it replays as a whole. Returns rows in replay order.
    async fn complete_partitions(
        &self,
        mut rows: Vec<attendance_event::Model>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<attendance_event::Model>, DbErr> {
        let outside: BTreeSet<(Uuid, NaiveDate)> = rows
            .iter()
            .filter(|row| row.business_date_local < from || row.business_date_local > to)
            .map(|row| (row.employee_id, row.business_date_local))
            .collect();

        if !outside.is_empty() {
            let mut seen: HashSet<Uuid> = rows.iter().map(|row| row.id).collect();
            for (employee_id, business_date_local) in outside {
                let partition = attendance_event::Entity::find()
                    .filter(attendance_event::Column::EmployeeId.eq(employee_id))
                    .filter(attendance_event::Column::BusinessDateLocal.eq(business_date_local))
                    .all(&self.db)
                    .await?;
                rows.extend(partition.into_iter().filter(|row| seen.insert(row.id)));
            }
        }

        rows.sort_by(|a, b| {
            (a.employee_id, a.business_date_local, a.event_timestamp_utc, a.sequence).cmp(&(
                b.employee_id,
                b.business_date_local,
                b.event_timestamp_utc,
                b.sequence,
            ))
        });
        Ok(rows)
    }
}

fn check_range(from: NaiveDate, to: NaiveDate) -> Result<(), ReportError> {
    if from > to {
        return Err(ReportError::InvertedRange { from, to });
    }
    if (to - from).num_days() >= MAX_RANGE_DAYS {
        return Err(ReportError::RangeTooLong);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_checked() {
        let day = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
        assert!(check_range(day, day).is_ok());
        assert!(matches!(
            check_range(day, day.pred_opt().unwrap()),
            Err(ReportError::InvertedRange { .. })
        ));
        assert!(matches!(
            check_range(day, day + chrono::Duration::days(MAX_RANGE_DAYS)),
            Err(ReportError::RangeTooLong)
        ));
    }

    #[test]
    fn findings_are_tagged_by_kind() {
        let finding = IntegrityFinding::OpenInterval {
            employee_id: Uuid::nil(),
            business_date_local: NaiveDate::from_ymd_opt(2025, 11, 26).unwrap(),
            interval: IntervalKind::Lunch,
        };
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["kind"], "open_interval");
        assert_eq!(json["interval"], "LUNCH");
    }
}
