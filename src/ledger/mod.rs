//! # Attendance Ledger
//!
//! The append-only event store. [`AttendanceLedger::record`] is the only write entry point:
//! it validates a clock action against the partition's history and commits the event, the
//! refreshed daily status and a sync task in one transaction.
//!
//! Appends for one `(employee_id, business_date_local)` partition are serialised by a row
//! lock on `attendance_partitions`. Appends for different partitions never wait on each
//! other.

pub mod state;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub use state::{LedgerViolation, PartitionState, ReplayFailure, SequenceRules, replay};

use crate::clock::Clock;
use crate::error::{is_transaction_conflict, is_unique_violation};
use crate::models::{AttendanceEventType, SyncStatus, attendance_event, attendance_partition, employee};
use crate::projection::{DailyStatusProjector, DailyStatusSnapshot};
use crate::sync::{RefreshNotifier, SyncTaskQueue};
use crate::telemetry::metric_names;

/// Attempts made when an append loses a race against a concurrent append.
const MAX_APPEND_ATTEMPTS: u32 = 5;

/// Pause before re-running a conflicted append, multiplied by the attempt number.
const APPEND_RETRY_STEP: Duration = Duration::from_millis(20);

/// A request to append one event.
#[derive(Debug, Clone)]
pub struct ClockAction {
    pub employee_id: Uuid,
    pub event_type: AttendanceEventType,
    /// Opaque metadata stored with the event
    pub payload: Option<JsonValue>,
    /// Who produced the event
    pub actor: String,
}

/// A committed event together with the state it produced.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecordedEvent {
    pub event_id: Uuid,
    pub employee_id: Uuid,
    pub event_type: AttendanceEventType,
    #[schema(value_type = String, format = DateTime)]
    pub event_timestamp_utc: DateTime<Utc>,
    #[schema(value_type = String, format = Date)]
    pub business_date_local: NaiveDate,
    pub sequence: i32,
    pub sync_task_id: Uuid,
    pub daily_status: DailyStatusSnapshot,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Violation(#[from] LedgerViolation),
    #[error("employee {0} does not exist")]
    UnknownEmployee(Uuid),
    #[error("append abandoned after {attempts} conflicting attempts")]
    Contention { attempts: u32 },
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Write side of the ledger.
#[derive(Debug, Clone)]
pub struct AttendanceLedger {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
    rules: SequenceRules,
    projector: DailyStatusProjector,
    queue: SyncTaskQueue,
    notifier: Arc<dyn RefreshNotifier>,
}

impl AttendanceLedger {
    pub fn new(
        db: DatabaseConnection,
        clock: Arc<dyn Clock>,
        rules: SequenceRules,
        projector: DailyStatusProjector,
        queue: SyncTaskQueue,
        notifier: Arc<dyn RefreshNotifier>,
    ) -> Self {
        Self {
            db,
            clock,
            rules,
            projector,
            queue,
            notifier,
        }
    }

    pub fn rules(&self) -> &SequenceRules {
        &self.rules
    }

    /// Validates and appends a clock action stamped with the current time.
    #[instrument(skip(self, action), fields(employee_id = %action.employee_id, event_type = %action.event_type))]
    pub async fn record(&self, action: ClockAction) -> Result<RecordedEvent, LedgerError> {
        let timestamp = self.clock.now();

        let mut attempt = 1;
        let result = loop {
            match self.try_record(&action, timestamp).await {
                Err(LedgerError::Database(err))
                    if is_unique_violation(&err) || is_transaction_conflict(&err) =>
                {
                    if attempt >= MAX_APPEND_ATTEMPTS {
                        break Err(LedgerError::Contention { attempts: attempt });
                    }
                    debug!(attempt, error = %err, "Append lost a race, re-validating");
                    tokio::time::sleep(APPEND_RETRY_STEP * attempt).await;
                    attempt += 1;
                }
                other => break other,
            }
        };

        match &result {
            Ok(recorded) => {
                counter!(metric_names::EVENTS_APPENDED, "event_type" => recorded.event_type.as_str())
                    .increment(1);
                info!(
                    event_id = %recorded.event_id,
                    business_date = %recorded.business_date_local,
                    sequence = recorded.sequence,
                    "Attendance event recorded"
                );
                self.queue.wake();
                self.notifier.notify(recorded.employee_id);
            }
            Err(LedgerError::Violation(violation)) => {
                counter!(metric_names::EVENTS_REJECTED, "violation" => violation.code())
                    .increment(1);
                info!(
                    business_date = %self.rules.calendar.business_date(timestamp),
                    violation = violation.code(),
                    "Attendance event rejected"
                );
            }
            Err(err) => warn!(error = %err, "Attendance event could not be recorded"),
        }

        result
    }

    async fn try_record(
        &self,
        action: &ClockAction,
        timestamp: DateTime<Utc>,
    ) -> Result<RecordedEvent, LedgerError> {
        let business_date = self.rules.calendar.business_date(timestamp);
        let txn = self.db.begin().await?;

        ensure_employee(&txn, action.employee_id).await?;
        let partition = lock_partition(&txn, action.employee_id, business_date, timestamp).await?;
        if partition.is_sealed() {
            return Err(LedgerViolation::PartitionSealed.into());
        }

        let history = attendance_event::Entity::find()
            .filter(attendance_event::Column::EmployeeId.eq(action.employee_id))
            .filter(attendance_event::Column::BusinessDateLocal.eq(business_date))
            .order_by_asc(attendance_event::Column::EventTimestampUtc)
            .order_by_asc(attendance_event::Column::Sequence)
            .all(&txn)
            .await?;

        let mut facts = Vec::with_capacity(history.len());
        for row in &history {
            let kind = row
                .kind()
                .map_err(|err| DbErr::Custom(format!("event {}: {err}", row.id)))?;
            facts.push((kind, row.event_timestamp_utc.with_timezone(&Utc)));
        }
        let state = PartitionState::fold(facts);
        self.rules.validate(&state, action.event_type, timestamp)?;

        let sequence = history.iter().map(|row| row.sequence).max().unwrap_or(0) + 1;
        let event_id = Uuid::new_v4();
        attendance_event::ActiveModel {
            id: Set(event_id),
            employee_id: Set(action.employee_id),
            event_type: Set(action.event_type.as_str().to_string()),
            event_timestamp_utc: Set(timestamp.into()),
            business_date_local: Set(business_date),
            sequence: Set(sequence),
            payload: Set(action.payload.clone()),
            sync_status: Set(SyncStatus::Pending.as_str().to_string()),
            attempt_count: Set(0),
            last_attempt_at: Set(None),
            sync_exhausted_at: Set(None),
            sync_request_body: Set(None),
            sync_response_body: Set(None),
            created_by: Set(action.actor.clone()),
            created_at: Set(timestamp.into()),
        }
        .insert(&txn)
        .await?;

        let sync_task_id = self
            .queue
            .enqueue(&txn, event_id, action.employee_id, timestamp)
            .await?;
        let daily_status = self
            .projector
            .refresh(&txn, action.employee_id, business_date)
            .await?;
        txn.commit().await?;

        Ok(RecordedEvent {
            event_id,
            employee_id: action.employee_id,
            event_type: action.event_type,
            event_timestamp_utc: timestamp,
            business_date_local: business_date,
            sequence,
            sync_task_id,
            daily_status,
        })
    }

    /// Closes a business date for an employee. Further appends to it are rejected and its
    /// status reads `LOCKED`. Sealing an already sealed date keeps the original seal.
    #[instrument(skip(self, actor))]
    pub async fn seal_partition(
        &self,
        employee_id: Uuid,
        business_date: NaiveDate,
        actor: &str,
    ) -> Result<DailyStatusSnapshot, LedgerError> {
        let now = self.clock.now();
        let txn = self.db.begin().await?;

        ensure_employee(&txn, employee_id).await?;
        let partition = lock_partition(&txn, employee_id, business_date, now).await?;
        if partition.is_sealed() {
            debug!("Business date already sealed");
        } else {
            let mut active: attendance_partition::ActiveModel = partition.into();
            active.sealed_at = Set(Some(now.into()));
            active.sealed_by = Set(Some(actor.to_string()));
            active.update(&txn).await?;
            info!(sealed_by = actor, "Business date sealed");
        }

        let snapshot = self.projector.refresh(&txn, employee_id, business_date).await?;
        txn.commit().await?;

        self.notifier.notify(employee_id);
        Ok(snapshot)
    }
}

async fn ensure_employee(txn: &DatabaseTransaction, employee_id: Uuid) -> Result<(), LedgerError> {
    employee::Entity::find_by_id(employee_id)
        .one(txn)
        .await?
        .map(|_| ())
        .ok_or(LedgerError::UnknownEmployee(employee_id))
}

/// Creates the partition row if needed and locks it for the rest of the transaction.
async fn lock_partition(
    txn: &DatabaseTransaction,
    employee_id: Uuid,
    business_date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<attendance_partition::Model, DbErr> {
    attendance_partition::Entity::insert(attendance_partition::ActiveModel {
        employee_id: Set(employee_id),
        business_date_local: Set(business_date),
        sealed_at: Set(None),
        sealed_by: Set(None),
        created_at: Set(now.into()),
    })
    .on_conflict(
        OnConflict::columns([
            attendance_partition::Column::EmployeeId,
            attendance_partition::Column::BusinessDateLocal,
        ])
        .do_nothing()
        .to_owned(),
    )
    .exec_without_returning(txn)
    .await?;

    attendance_partition::Entity::find_by_id((employee_id, business_date))
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("partition {employee_id}/{business_date}")))
}
