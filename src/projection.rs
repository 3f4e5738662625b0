//! Daily status projection.
//!
//! [`project`] is a pure function of a partition's events and its sealed flag. The
//! [`DailyStatusProjector`] loads those inputs inside the caller's transaction and
//! overwrites the `daily_status` row with the result.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::business_date::BusinessCalendar;
use crate::models::attendance_event::{self, UnknownVariant};
use crate::models::{AttendanceEventType, SyncStatus, attendance_partition, daily_status};

/// Status shown on dashboards for one employee-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurrentStatus {
    OffDuty,
    OnShift,
    OnBreak,
    OnLunch,
    Locked,
    Late,
}

impl CurrentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurrentStatus::OffDuty => "OFF_DUTY",
            CurrentStatus::OnShift => "ON_SHIFT",
            CurrentStatus::OnBreak => "ON_BREAK",
            CurrentStatus::OnLunch => "ON_LUNCH",
            CurrentStatus::Locked => "LOCKED",
            CurrentStatus::Late => "LATE",
        }
    }

    /// Status implied by the most recent event type alone.
    fn implied_by(last: Option<AttendanceEventType>) -> Self {
        match last {
            None | Some(AttendanceEventType::ClockOut) => CurrentStatus::OffDuty,
            Some(AttendanceEventType::ClockIn)
            | Some(AttendanceEventType::BreakEnd)
            | Some(AttendanceEventType::LunchEnd) => CurrentStatus::OnShift,
            Some(AttendanceEventType::BreakStart) => CurrentStatus::OnBreak,
            Some(AttendanceEventType::LunchStart) => CurrentStatus::OnLunch,
        }
    }
}

impl fmt::Display for CurrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrentStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "OFF_DUTY" => Ok(CurrentStatus::OffDuty),
            "ON_SHIFT" => Ok(CurrentStatus::OnShift),
            "ON_BREAK" => Ok(CurrentStatus::OnBreak),
            "ON_LUNCH" => Ok(CurrentStatus::OnLunch),
            "LOCKED" => Ok(CurrentStatus::Locked),
            "LATE" => Ok(CurrentStatus::Late),
            other => Err(UnknownVariant {
                kind: "current status",
                value: other.to_string(),
            }),
        }
    }
}

/// The slice of an event the projection depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFact {
    pub sequence: i32,
    pub event_type: AttendanceEventType,
    pub timestamp: DateTime<Utc>,
    pub sync_status: SyncStatus,
    pub sync_exhausted: bool,
}

impl TryFrom<&attendance_event::Model> for EventFact {
    type Error = UnknownVariant;

    fn try_from(row: &attendance_event::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            sequence: row.sequence,
            event_type: row.kind()?,
            timestamp: row.event_timestamp_utc.with_timezone(&Utc),
            sync_status: row.status()?,
            sync_exhausted: row.sync_exhausted_at.is_some(),
        })
    }
}

/// Projected daily status of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DailyStatusSnapshot {
    pub employee_id: Uuid,
    #[schema(value_type = String, format = Date)]
    pub business_date_local: NaiveDate,
    pub current_status: CurrentStatus,
    pub break_minutes_used: i32,
    pub lunch_minutes_used: i32,
    pub is_late: bool,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub first_clock_in_utc: Option<DateTime<Utc>>,
    pub last_event_type: Option<AttendanceEventType>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_event_timestamp_utc: Option<DateTime<Utc>>,
    pub has_sync_errors: bool,
}

impl DailyStatusSnapshot {
    fn into_active_model(self) -> daily_status::ActiveModel {
        daily_status::ActiveModel {
            employee_id: Set(self.employee_id),
            business_date_local: Set(self.business_date_local),
            current_status: Set(self.current_status.as_str().to_string()),
            break_minutes_used: Set(self.break_minutes_used),
            lunch_minutes_used: Set(self.lunch_minutes_used),
            is_late: Set(self.is_late),
            first_clock_in_utc: Set(self.first_clock_in_utc.map(Into::into)),
            last_event_type: Set(self.last_event_type.map(|kind| kind.as_str().to_string())),
            last_event_timestamp_utc: Set(self.last_event_timestamp_utc.map(Into::into)),
            has_sync_errors: Set(self.has_sync_errors),
        }
    }
}

impl TryFrom<daily_status::Model> for DailyStatusSnapshot {
    type Error = UnknownVariant;

    fn try_from(row: daily_status::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            employee_id: row.employee_id,
            business_date_local: row.business_date_local,
            current_status: row.current_status.parse()?,
            break_minutes_used: row.break_minutes_used,
            lunch_minutes_used: row.lunch_minutes_used,
            is_late: row.is_late,
            first_clock_in_utc: row.first_clock_in_utc.map(|ts| ts.with_timezone(&Utc)),
            last_event_type: row.last_event_type.as_deref().map(str::parse).transpose()?,
            last_event_timestamp_utc: row
                .last_event_timestamp_utc
                .map(|ts| ts.with_timezone(&Utc)),
            has_sync_errors: row.has_sync_errors,
        })
    }
}

/// Sums the durations of closed start/end pairs, floored to whole minutes.
fn closed_pair_minutes(
    events: &[EventFact],
    start: AttendanceEventType,
    end: AttendanceEventType,
) -> i32 {
    let mut open: Option<DateTime<Utc>> = None;
    let mut total_seconds: i64 = 0;
    for event in events {
        if event.event_type == start {
            open.get_or_insert(event.timestamp);
        } else if event.event_type == end {
            if let Some(started) = open.take() {
                total_seconds += (event.timestamp - started).num_seconds().max(0);
            }
        }
    }
    i32::try_from(total_seconds / 60).unwrap_or(i32::MAX)
}

/// Computes the daily status of one partition. Side-effect free and order-insensitive in
/// its input: events are sorted by `(timestamp, sequence)` first.
pub fn project(
    employee_id: Uuid,
    business_date_local: NaiveDate,
    events: &[EventFact],
    sealed: bool,
    calendar: &BusinessCalendar,
    late_cutoff_local: NaiveTime,
) -> DailyStatusSnapshot {
    let mut ordered = events.to_vec();
    ordered.sort_by_key(|event| (event.timestamp, event.sequence));

    let first_clock_in_utc = ordered
        .iter()
        .find(|event| event.event_type == AttendanceEventType::ClockIn)
        .map(|event| event.timestamp);
    let is_late = first_clock_in_utc
        .map(|ts| calendar.local_time(ts) > late_cutoff_local)
        .unwrap_or(false);

    let last = ordered.last();
    let implied = CurrentStatus::implied_by(last.map(|event| event.event_type));
    let current_status = if sealed {
        CurrentStatus::Locked
    } else if is_late && implied == CurrentStatus::OnShift {
        CurrentStatus::Late
    } else {
        implied
    };

    DailyStatusSnapshot {
        employee_id,
        business_date_local,
        current_status,
        break_minutes_used: closed_pair_minutes(
            &ordered,
            AttendanceEventType::BreakStart,
            AttendanceEventType::BreakEnd,
        ),
        lunch_minutes_used: closed_pair_minutes(
            &ordered,
            AttendanceEventType::LunchStart,
            AttendanceEventType::LunchEnd,
        ),
        is_late,
        first_clock_in_utc,
        last_event_type: last.map(|event| event.event_type),
        last_event_timestamp_utc: last.map(|event| event.timestamp),
        has_sync_errors: ordered
            .iter()
            .any(|event| event.sync_status == SyncStatus::Failed && event.sync_exhausted),
    }
}

/// Rebuilds and stores the projection for a partition.
#[derive(Debug, Clone, Copy)]
pub struct DailyStatusProjector {
    calendar: BusinessCalendar,
    late_cutoff_local: NaiveTime,
}

impl DailyStatusProjector {
    pub fn new(calendar: BusinessCalendar, late_cutoff_local: NaiveTime) -> Self {
        Self {
            calendar,
            late_cutoff_local,
        }
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// Recomputes the projection from the ledger rows visible to `conn` and overwrites the
    /// stored row. Call it inside the transaction that changed the partition.
    pub async fn refresh<C>(
        &self,
        conn: &C,
        employee_id: Uuid,
        business_date_local: NaiveDate,
    ) -> Result<DailyStatusSnapshot, DbErr>
    where
        C: ConnectionTrait,
    {
        let rows = attendance_event::Entity::find()
            .filter(attendance_event::Column::EmployeeId.eq(employee_id))
            .filter(attendance_event::Column::BusinessDateLocal.eq(business_date_local))
            .order_by_asc(attendance_event::Column::EventTimestampUtc)
            .order_by_asc(attendance_event::Column::Sequence)
            .all(conn)
            .await?;

        let facts: Vec<EventFact> = rows
            .iter()
            .filter_map(|row| match EventFact::try_from(row) {
                Ok(fact) => Some(fact),
                Err(err) => {
                    warn!(event_id = %row.id, error = %err, "Skipping unreadable event in projection");
                    None
                }
            })
            .collect();

        let sealed = attendance_partition::Entity::find_by_id((employee_id, business_date_local))
            .one(conn)
            .await?
            .map(|partition| partition.is_sealed())
            .unwrap_or(false);

        let snapshot = project(
            employee_id,
            business_date_local,
            &facts,
            sealed,
            &self.calendar,
            self.late_cutoff_local,
        );

        daily_status::Entity::insert(snapshot.clone().into_active_model())
            .on_conflict(
                OnConflict::columns([
                    daily_status::Column::EmployeeId,
                    daily_status::Column::BusinessDateLocal,
                ])
                .update_columns([
                    daily_status::Column::CurrentStatus,
                    daily_status::Column::BreakMinutesUsed,
                    daily_status::Column::LunchMinutesUsed,
                    daily_status::Column::IsLate,
                    daily_status::Column::FirstClockInUtc,
                    daily_status::Column::LastEventType,
                    daily_status::Column::LastEventTimestampUtc,
                    daily_status::Column::HasSyncErrors,
                ])
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        Ok(snapshot)
    }
}
