//! Durable delivery queue backed by the `sync_tasks` table.
//!
//! Tasks are inserted in the same transaction as the event they deliver. Workers claim
//! tasks with a per-row compare-and-set, so a task is never held by two workers. Completed
//! tasks are deleted; abandoned tasks stay behind for inspection.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue::Set, ConnectionTrait, QueryOrder, QuerySelect};
use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::sync_task::{self, STATUS_ABANDONED, STATUS_QUEUED, STATUS_RUNNING};

/// Handle to the delivery queue. Cheap to clone; clones share the wake-up signal.
#[derive(Debug, Clone, Default)]
pub struct SyncTaskQueue {
    wake: Arc<Notify>,
}

impl SyncTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a task for `event_id`, runnable immediately.
    pub async fn enqueue<C>(
        &self,
        conn: &C,
        event_id: Uuid,
        employee_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Uuid, DbErr>
    where
        C: ConnectionTrait,
    {
        let id = Uuid::new_v4();
        sync_task::ActiveModel {
            id: Set(id),
            attendance_event_id: Set(event_id),
            employee_id: Set(employee_id),
            status: Set(STATUS_QUEUED.to_string()),
            attempts: Set(0),
            run_after: Set(now.into()),
            started_at: Set(None),
            last_error: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(conn)
        .await?;
        debug!(task_id = %id, event_id = %event_id, "Sync task enqueued");
        Ok(id)
    }

    /// Signals idle workers that new work is available. Call after the enqueuing
    /// transaction has committed.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Waits for a wake-up or until `timeout` elapses.
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.wake.notified()).await;
    }

    /// Claims up to `limit` due tasks, incrementing each claimed task's attempt counter.
    pub async fn claim<C>(
        &self,
        conn: &C,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<sync_task::Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        let candidates: Vec<Uuid> = sync_task::Entity::find()
            .select_only()
            .column(sync_task::Column::Id)
            .filter(sync_task::Column::Status.eq(STATUS_QUEUED))
            .filter(sync_task::Column::RunAfter.lte(now))
            .order_by_asc(sync_task::Column::RunAfter)
            .order_by_asc(sync_task::Column::CreatedAt)
            .limit(limit)
            .into_tuple()
            .all(conn)
            .await?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            let result = sync_task::Entity::update_many()
                .col_expr(sync_task::Column::Status, Expr::value(STATUS_RUNNING))
                .col_expr(
                    sync_task::Column::Attempts,
                    Expr::col(sync_task::Column::Attempts).add(1),
                )
                .col_expr(sync_task::Column::StartedAt, Expr::value(now))
                .col_expr(sync_task::Column::UpdatedAt, Expr::value(now))
                .filter(sync_task::Column::Id.eq(id))
                .filter(sync_task::Column::Status.eq(STATUS_QUEUED))
                .exec(conn)
                .await?;

            // Another worker won the row.
            if result.rows_affected != 1 {
                continue;
            }

            if let Some(task) = sync_task::Entity::find_by_id(id).one(conn).await? {
                claimed.push(task);
            }
        }

        Ok(claimed)
    }

    /// Removes a finished task.
    pub async fn complete<C>(&self, conn: &C, task_id: Uuid) -> Result<(), DbErr>
    where
        C: ConnectionTrait,
    {
        sync_task::Entity::delete_by_id(task_id).exec(conn).await?;
        Ok(())
    }

    /// Puts a failed task back in the queue to run no earlier than `run_after`. Returns
    /// false when the task is no longer held by a worker (recovered and discarded
    /// elsewhere); the caller must not assume a retry is scheduled.
    pub async fn reschedule<C>(
        &self,
        conn: &C,
        task_id: Uuid,
        run_after: DateTime<Utc>,
        error: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr>
    where
        C: ConnectionTrait,
    {
        let result = sync_task::Entity::update_many()
            .col_expr(sync_task::Column::Status, Expr::value(STATUS_QUEUED))
            .col_expr(sync_task::Column::RunAfter, Expr::value(run_after))
            .col_expr(sync_task::Column::StartedAt, Expr::value(Option::<DateTime<Utc>>::None))
            .col_expr(sync_task::Column::LastError, Expr::value(error))
            .col_expr(sync_task::Column::UpdatedAt, Expr::value(now))
            .filter(sync_task::Column::Id.eq(task_id))
            .filter(sync_task::Column::Status.eq(STATUS_RUNNING))
            .exec(conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Inserts a queued replacement for a task whose row was lost while a worker held it.
    /// The attempt count carries over so the retry ceiling still applies.
    pub async fn requeue_lost<C>(
        &self,
        conn: &C,
        lost: &sync_task::Model,
        run_after: DateTime<Utc>,
        error: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<Uuid, DbErr>
    where
        C: ConnectionTrait,
    {
        let id = Uuid::new_v4();
        sync_task::ActiveModel {
            id: Set(id),
            attendance_event_id: Set(lost.attendance_event_id),
            employee_id: Set(lost.employee_id),
            status: Set(STATUS_QUEUED.to_string()),
            attempts: Set(lost.attempts),
            run_after: Set(run_after.into()),
            started_at: Set(None),
            last_error: Set(Some(error)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(conn)
        .await?;
        warn!(task_id = %id, lost_task_id = %lost.id, "Sync task row lost, replacement queued");
        Ok(id)
    }

    /// Gives up on a task. It is never claimed again. Returns false when the task row no
    /// longer exists.
    pub async fn abandon<C>(
        &self,
        conn: &C,
        task_id: Uuid,
        error: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr>
    where
        C: ConnectionTrait,
    {
        let result = sync_task::Entity::update_many()
            .col_expr(sync_task::Column::Status, Expr::value(STATUS_ABANDONED))
            .col_expr(sync_task::Column::LastError, Expr::value(error))
            .col_expr(sync_task::Column::UpdatedAt, Expr::value(now))
            .filter(sync_task::Column::Id.eq(task_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Re-queues tasks whose worker has held them longer than `lease`. Returns the number
    /// of recovered tasks.
    pub async fn recover_stale<C>(
        &self,
        conn: &C,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<u64, DbErr>
    where
        C: ConnectionTrait,
    {
        let lease = chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(lease).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let result = sync_task::Entity::update_many()
            .col_expr(sync_task::Column::Status, Expr::value(STATUS_QUEUED))
            .col_expr(sync_task::Column::RunAfter, Expr::value(now))
            .col_expr(sync_task::Column::UpdatedAt, Expr::value(now))
            .filter(sync_task::Column::Status.eq(STATUS_RUNNING))
            .filter(sync_task::Column::StartedAt.lt(cutoff))
            .exec(conn)
            .await?;

        if result.rows_affected > 0 {
            warn!(recovered = result.rows_affected, "Re-queued stale sync tasks");
        }
        Ok(result.rows_affected)
    }

    /// Tasks (any status) referencing `event_id`.
    pub async fn tasks_for_event<C>(
        &self,
        conn: &C,
        event_id: Uuid,
    ) -> Result<Vec<sync_task::Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        sync_task::Entity::find()
            .filter(sync_task::Column::AttendanceEventId.eq(event_id))
            .order_by_asc(sync_task::Column::CreatedAt)
            .all(conn)
            .await
    }
}
