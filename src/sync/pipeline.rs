//! Delivery pipeline.
//!
//! A worker pool pulls tasks from [`SyncTaskQueue`] and delivers the referenced events to
//! the HR system. Each delivery runs in three steps:
//!
//! 1. Lock the event row, transition it to `PROCESSING` and bump `attempt_count`; commit.
//! 2. Resolve the employee's external identity and push, outside any transaction.
//! 3. Lock the event row again and write back the outcome, the projection and the task's
//!    fate in one transaction.
//!
//! An event in `PROCESSING` whose last attempt is younger than the lease belongs to another
//! worker; tasks that find it that way are discarded as duplicates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, DatabaseConnection, DbErr, EntityTrait, QuerySelect,
    TransactionTrait,
};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::identity::{IdentityGap, IdentityResolver};
use super::notifier::RefreshNotifier;
use super::policy::RetryPolicy;
use super::push::{HrPushClient, PushError, PushRequest, PushResponse, external_status_code};
use super::queue::SyncTaskQueue;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::models::attendance_event::{self, UnknownVariant};
use crate::models::{SyncStatus, sync_task};
use crate::projection::DailyStatusProjector;
use crate::telemetry::metric_names;

/// Device identity used when none is configured (local and test profiles).
const DEFAULT_DEVICE_ID: &str = "attendance-ledger";

/// Worker pool and delivery settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub policy: RetryPolicy,
    pub workers: usize,
    pub claim_batch: u64,
    pub tick: Duration,
    pub lease: Duration,
    pub push_timeout: Duration,
    pub device_id: String,
}

impl SyncSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            policy: RetryPolicy::from_config(&config.sync),
            workers: config.sync.workers,
            claim_batch: config.sync.claim_batch,
            tick: config.sync.tick(),
            lease: config.sync.lease(),
            push_timeout: config.sync.push_timeout(),
            device_id: config
                .hr_push
                .device_id
                .clone()
                .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
        }
    }
}

/// External collaborators of the pipeline.
#[derive(Debug, Clone)]
pub struct SyncCollaborators {
    pub push: Arc<dyn HrPushClient>,
    pub identity: Arc<dyn IdentityResolver>,
    pub notifier: Arc<dyn RefreshNotifier>,
    pub clock: Arc<dyn Clock>,
}

/// Why a delivery attempt failed.
#[derive(Debug, Clone, Error)]
pub enum SyncFailure {
    #[error("employee cannot be resolved: {0}")]
    Unresolvable(IdentityGap),
    #[error("stored event is unreadable: {0}")]
    Corrupt(#[from] UnknownVariant),
    #[error("identity lookup failed: {0}")]
    Lookup(String),
    #[error(transparent)]
    Push(#[from] PushError),
}

impl SyncFailure {
    pub fn is_transient(&self) -> bool {
        match self {
            SyncFailure::Unresolvable(_) | SyncFailure::Corrupt(_) => false,
            SyncFailure::Lookup(_) => true,
            SyncFailure::Push(err) => err.is_transient(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            SyncFailure::Unresolvable(gap) => gap.code(),
            SyncFailure::Corrupt(_) => "corrupt_event",
            SyncFailure::Lookup(_) => "identity_lookup_failed",
            SyncFailure::Push(err) => err.kind(),
        }
    }

    /// Body stored in `sync_response_body` for this failure.
    fn response_body(&self) -> JsonValue {
        match self {
            SyncFailure::Push(err) => err
                .response_body()
                .cloned()
                .unwrap_or_else(|| json!({ "error": self.code(), "message": err.to_string() })),
            _ => json!({ "error": self.code(), "message": self.to_string() }),
        }
    }
}

/// What happened to one claimed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The HR system accepted the event.
    Delivered,
    /// The event type is not pushed externally; marked successful without a push.
    Skipped,
    /// The referenced event no longer exists.
    Dropped,
    /// The event had already been delivered.
    AlreadyDelivered,
    /// Another worker holds the event.
    InFlightElsewhere,
    /// Transient failure; the task runs again at `run_after`.
    Retrying { run_after: DateTime<Utc> },
    /// Terminal failure; the event stays `FAILED` until an operator retries it.
    Abandoned { reason: String },
}

/// Errors from [`SyncPipeline::retry_event`].
#[derive(Debug, Error)]
pub enum RetryEventError {
    #[error("attendance event {0} not found")]
    EventNotFound(Uuid),
    #[error("attendance event {event_id} is {status} and cannot be retried")]
    NotRetryable { event_id: Uuid, status: String },
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// State carried from the claim step into the push step.
struct Prepared {
    event: attendance_event::Model,
    status_code: u8,
}

enum Prelude {
    Ready(Prepared),
    Finished(TaskOutcome),
}

/// The delivery worker pool. Cheap to clone; clones share everything.
#[derive(Debug, Clone)]
pub struct SyncPipeline {
    db: DatabaseConnection,
    queue: SyncTaskQueue,
    projector: DailyStatusProjector,
    settings: SyncSettings,
    collaborators: SyncCollaborators,
}

impl SyncPipeline {
    pub fn new(
        db: DatabaseConnection,
        queue: SyncTaskQueue,
        projector: DailyStatusProjector,
        settings: SyncSettings,
        collaborators: SyncCollaborators,
    ) -> Self {
        Self {
            db,
            queue,
            projector,
            settings,
            collaborators,
        }
    }

    pub fn queue(&self) -> &SyncTaskQueue {
        &self.queue
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        self.collaborators.clock.now()
    }

    /// Runs the worker pool until `shutdown` is cancelled, then waits for in-flight
    /// deliveries to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            workers = self.settings.workers,
            max_attempts = self.settings.policy.max_attempts,
            "Starting sync pipeline"
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.workers));
        let mut in_flight = JoinSet::new();

        while !shutdown.is_cancelled() {
            while in_flight.try_join_next().is_some() {}

            if let Err(err) = self
                .queue
                .recover_stale(&self.db, self.now(), self.settings.lease)
                .await
            {
                error!(error = %err, "Failed to recover stale sync tasks");
            }

            // Only claim what can start right away so claimed tasks never sit idle.
            let free = semaphore.available_permits() as u64;
            if free > 0 {
                match self
                    .queue
                    .claim(&self.db, self.now(), free.min(self.settings.claim_batch))
                    .await
                {
                    Ok(tasks) => {
                        if !tasks.is_empty() {
                            debug!(claimed = tasks.len(), "Claimed sync tasks");
                        }
                        for task in tasks {
                            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                break;
                            };
                            let pipeline = self.clone();
                            in_flight.spawn(async move {
                                let _permit = permit;
                                pipeline.run_task(task).await;
                            });
                        }
                    }
                    Err(err) => error!(error = %err, "Failed to claim sync tasks"),
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.queue.wait(self.settings.tick) => {}
            }
        }

        while in_flight.join_next().await.is_some() {}
        info!("Sync pipeline stopped");
    }

    /// One polling round: recovers stale tasks, claims due tasks and processes them with
    /// bounded concurrency. Returns the outcomes of the claimed tasks.
    pub async fn run_once(&self) -> Result<Vec<TaskOutcome>, DbErr> {
        let now = self.now();
        self.queue
            .recover_stale(&self.db, now, self.settings.lease)
            .await?;
        let tasks = self
            .queue
            .claim(&self.db, now, self.settings.claim_batch)
            .await?;

        let semaphore = Arc::new(Semaphore::new(self.settings.workers));
        let mut in_flight = JoinSet::new();
        for task in tasks {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|err| DbErr::Custom(err.to_string()))?;
            let pipeline = self.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                pipeline.process_task(task).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(err)) => return Err(err),
                Err(err) => return Err(DbErr::Custom(format!("sync task panicked: {err}"))),
            }
        }
        Ok(outcomes)
    }

    async fn run_task(&self, task: sync_task::Model) {
        let task_id = task.id;
        if let Err(err) = self.process_task(task).await {
            // The task stays running and is re-queued once its lease expires.
            error!(task_id = %task_id, error = %err, "Sync task failed with a storage error");
        }
    }

    /// Delivers the event referenced by a claimed task.
    #[instrument(
        skip(self, task),
        fields(task_id = %task.id, event_id = %task.attendance_event_id, attempt = task.attempts)
    )]
    pub async fn process_task(&self, task: sync_task::Model) -> Result<TaskOutcome, DbErr> {
        let prepared = match self.begin_attempt(&task).await? {
            Prelude::Ready(prepared) => prepared,
            Prelude::Finished(outcome) => {
                debug!(?outcome, "Sync task finished without a push");
                return Ok(outcome);
            }
        };

        let event = &prepared.event;
        let external_id = match self.collaborators.identity.resolve(event.employee_id).await {
            Ok(Ok(external_id)) => external_id,
            Ok(Err(gap)) => {
                return self
                    .write_back(&task, event.id, None, Err(SyncFailure::Unresolvable(gap)))
                    .await;
            }
            Err(err) => {
                return self
                    .write_back(&task, event.id, None, Err(SyncFailure::Lookup(err.to_string())))
                    .await;
            }
        };

        let request = PushRequest {
            device_identifier: self.settings.device_id.clone(),
            employee_attendance_number: external_id,
            timestamp: self
                .projector
                .calendar()
                .format_external(event.event_timestamp_utc.with_timezone(&Utc)),
            status: prepared.status_code,
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.settings.push_timeout,
            self.collaborators.push.push(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PushError::Timeout(self.settings.push_timeout)),
        };
        histogram!(metric_names::SYNC_PUSH_DURATION_MS)
            .record(started.elapsed().as_secs_f64() * 1000.0);

        self.write_back(&task, event.id, Some(&request), result.map_err(SyncFailure::from))
            .await
    }

    /// Step 1: lock the event and move it to `PROCESSING`, or finish the task early.
    async fn begin_attempt(&self, task: &sync_task::Model) -> Result<Prelude, DbErr> {
        let now = self.now();
        let txn = self.db.begin().await?;

        let Some(event) = attendance_event::Entity::find_by_id(task.attendance_event_id)
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            self.queue.complete(&txn, task.id).await?;
            txn.commit().await?;
            info!("Referenced event no longer exists, task dropped");
            return Ok(Prelude::Finished(TaskOutcome::Dropped));
        };

        let (kind, status) = match (event.kind(), event.status()) {
            (Ok(kind), Ok(status)) => (kind, status),
            (Err(err), _) | (_, Err(err)) => {
                txn.rollback().await?;
                let outcome = self
                    .write_back(task, event.id, None, Err(SyncFailure::Corrupt(err)))
                    .await?;
                return Ok(Prelude::Finished(outcome));
            }
        };

        match status {
            SyncStatus::Success => {
                self.queue.complete(&txn, task.id).await?;
                txn.commit().await?;
                return Ok(Prelude::Finished(TaskOutcome::AlreadyDelivered));
            }
            SyncStatus::Processing if self.lease_held(&event, now) => {
                self.queue.complete(&txn, task.id).await?;
                txn.commit().await?;
                return Ok(Prelude::Finished(TaskOutcome::InFlightElsewhere));
            }
            _ => {}
        }

        let employee_id = event.employee_id;
        let business_date = event.business_date_local;

        let Some(status_code) = external_status_code(kind) else {
            let mut active: attendance_event::ActiveModel = event.into();
            active.sync_status = Set(SyncStatus::Success.as_str().to_string());
            active.sync_exhausted_at = Set(None);
            active.sync_response_body = Set(Some(json!({
                "skipped": format!("{kind} is not delivered to the HR system"),
            })));
            active.update(&txn).await?;
            self.queue.complete(&txn, task.id).await?;
            self.projector.refresh(&txn, employee_id, business_date).await?;
            txn.commit().await?;

            counter!(metric_names::SYNC_ATTEMPTS, "outcome" => "skipped").increment(1);
            self.collaborators.notifier.notify(employee_id);
            return Ok(Prelude::Finished(TaskOutcome::Skipped));
        };

        let mut active: attendance_event::ActiveModel = event.clone().into();
        active.sync_status = Set(SyncStatus::Processing.as_str().to_string());
        active.attempt_count = Set(event.attempt_count + 1);
        active.last_attempt_at = Set(Some(now.into()));
        let event = active.update(&txn).await?;
        txn.commit().await?;

        Ok(Prelude::Ready(Prepared { event, status_code }))
    }

    fn lease_held(&self, event: &attendance_event::Model, now: DateTime<Utc>) -> bool {
        let Some(last_attempt) = event.last_attempt_at else {
            return false;
        };
        let lease = chrono::Duration::from_std(self.settings.lease).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(last_attempt.with_timezone(&Utc)) < lease
    }

    /// Step 3: record the outcome of an attempt.
    async fn write_back(
        &self,
        task: &sync_task::Model,
        event_id: Uuid,
        request: Option<&PushRequest>,
        result: Result<PushResponse, SyncFailure>,
    ) -> Result<TaskOutcome, DbErr> {
        let now = self.now();
        let txn = self.db.begin().await?;

        let Some(event) = attendance_event::Entity::find_by_id(event_id)
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            self.queue.complete(&txn, task.id).await?;
            txn.commit().await?;
            return Ok(TaskOutcome::Dropped);
        };

        let employee_id = event.employee_id;
        let business_date = event.business_date_local;
        let attempts = u32::try_from(task.attempts).unwrap_or(0);

        let mut active: attendance_event::ActiveModel = event.into();
        if let Some(request) = request {
            active.sync_request_body = Set(Some(request.body()));
        }

        let outcome = match result {
            Ok(response) => {
                active.sync_status = Set(SyncStatus::Success.as_str().to_string());
                active.sync_response_body = Set(Some(response.body));
                active.sync_exhausted_at = Set(None);
                active.update(&txn).await?;
                self.queue.complete(&txn, task.id).await?;
                counter!(metric_names::SYNC_ATTEMPTS, "outcome" => "success").increment(1);
                info!(employee_id = %employee_id, "Attendance event delivered");
                TaskOutcome::Delivered
            }
            Err(failure) => {
                active.sync_status = Set(SyncStatus::Failed.as_str().to_string());
                active.sync_response_body = Set(Some(failure.response_body()));

                let details = json!({
                    "code": failure.code(),
                    "message": failure.to_string(),
                    "attempts": attempts,
                    "at": now.to_rfc3339(),
                });

                if failure.is_transient() && !self.settings.policy.is_exhausted(attempts) {
                    let hint = match &failure {
                        SyncFailure::Push(push_err) => push_err.retry_after(),
                        _ => None,
                    };
                    let delay = self.settings.policy.retry_delay(attempts, hint);
                    let run_after = chrono::Duration::from_std(delay)
                        .ok()
                        .and_then(|delay| now.checked_add_signed(delay))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);

                    active.sync_exhausted_at = Set(None);
                    active.update(&txn).await?;
                    let rescheduled = self
                        .queue
                        .reschedule(&txn, task.id, run_after, details.clone(), now)
                        .await?;
                    if !rescheduled {
                        self.queue
                            .requeue_lost(&txn, task, run_after, details, now)
                            .await?;
                    }
                    counter!(metric_names::SYNC_ATTEMPTS, "outcome" => "retry").increment(1);
                    warn!(
                        employee_id = %employee_id,
                        attempts,
                        error = %failure,
                        retry_in_ms = delay.as_millis() as u64,
                        "Delivery failed, retry scheduled"
                    );
                    TaskOutcome::Retrying { run_after }
                } else {
                    active.sync_exhausted_at = Set(Some(now.into()));
                    active.update(&txn).await?;
                    if !self.queue.abandon(&txn, task.id, details, now).await? {
                        // The exhausted event is still visible and retryable by an operator.
                        warn!(task_id = %task.id, "Abandoned sync task row was already gone");
                    }
                    let outcome = if failure.is_transient() {
                        "exhausted"
                    } else {
                        "permanent_failure"
                    };
                    counter!(metric_names::SYNC_ATTEMPTS, "outcome" => outcome).increment(1);
                    error!(
                        employee_id = %employee_id,
                        attempts,
                        error = %failure,
                        "Delivery abandoned, event left FAILED"
                    );
                    TaskOutcome::Abandoned {
                        reason: failure.code().to_string(),
                    }
                }
            }
        };

        self.projector.refresh(&txn, employee_id, business_date).await?;
        txn.commit().await?;
        self.collaborators.notifier.notify(employee_id);

        Ok(outcome)
    }

    /// Re-enqueues an event whose delivery was abandoned. `attempt_count` is kept; the new
    /// task gets a fresh attempt budget.
    #[instrument(skip(self))]
    pub async fn retry_event(&self, event_id: Uuid) -> Result<Uuid, RetryEventError> {
        let now = self.now();
        let txn = self.db.begin().await?;

        let event = attendance_event::Entity::find_by_id(event_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(RetryEventError::EventNotFound(event_id))?;

        let terminal_failure =
            event.status() == Ok(SyncStatus::Failed) && event.sync_exhausted_at.is_some();
        if !terminal_failure {
            return Err(RetryEventError::NotRetryable {
                event_id,
                status: event.sync_status.clone(),
            });
        }

        let employee_id = event.employee_id;
        let business_date = event.business_date_local;

        let mut active: attendance_event::ActiveModel = event.into();
        active.sync_status = Set(SyncStatus::Pending.as_str().to_string());
        active.sync_exhausted_at = Set(None);
        active.update(&txn).await?;

        let task_id = self.queue.enqueue(&txn, event_id, employee_id, now).await?;
        self.projector.refresh(&txn, employee_id, business_date).await?;
        txn.commit().await?;

        info!(task_id = %task_id, "Delivery re-enqueued by operator");
        self.queue.wake();
        self.collaborators.notifier.notify(employee_id);
        Ok(task_id)
    }
}
