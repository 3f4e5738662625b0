//! Reachability check against the HR ingestion endpoint.
//!
//! Each run pushes the canary entry, classifies the reply and stores one
//! `hr_health_checks` row. Serving processes run it on an interval; operators can run it
//! once with `attendance health-check`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, DatabaseConnection, DbErr, EntityTrait, QueryOrder,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::push::{HrPushClient, PushError};
use crate::clock::Clock;
use crate::models::hr_health_check;
use crate::telemetry::metric_names;

#[derive(Debug, Clone)]
pub struct HrHealthCheck {
    db: DatabaseConnection,
    push: Arc<dyn HrPushClient>,
    clock: Arc<dyn Clock>,
    device_id: String,
    timeout: Duration,
}

impl HrHealthCheck {
    pub fn new(
        db: DatabaseConnection,
        push: Arc<dyn HrPushClient>,
        clock: Arc<dyn Clock>,
        device_id: String,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            push,
            clock,
            device_id,
            timeout,
        }
    }

    /// Pushes the canary and records the outcome. A failed check is a stored result, not
    /// an error; only the write itself can fail.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<hr_health_check::Model, DbErr> {
        let checked_at = self.clock.now();
        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.timeout,
            self.push.check_reachability(&self.device_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PushError::Timeout(self.timeout)),
        };
        let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        let (ingestion_ok, http_status, error_details) = match &result {
            Ok(response) => (true, Some(i32::from(response.status)), None),
            Err(err) => (
                false,
                err.status().map(i32::from),
                Some(json!({
                    "kind": err.kind(),
                    "message": err.to_string(),
                    "body": err.response_body(),
                })),
            ),
        };

        let outcome = if ingestion_ok { "ok" } else { "failed" };
        counter!(metric_names::HR_HEALTH_CHECKS, "outcome" => outcome).increment(1);
        match &result {
            Ok(_) => info!(latency_ms, "HR ingestion endpoint is reachable"),
            Err(err) => warn!(
                latency_ms,
                kind = err.kind(),
                error = %err,
                "HR ingestion health check failed"
            ),
        }

        hr_health_check::ActiveModel {
            id: Set(Uuid::new_v4()),
            checked_at: Set(checked_at.into()),
            ingestion_ok: Set(ingestion_ok),
            http_status: Set(http_status),
            latency_ms: Set(latency_ms),
            error_details: Set(error_details),
        }
        .insert(&self.db)
        .await
    }

    /// Most recent stored result.
    pub async fn latest(&self) -> Result<Option<hr_health_check::Model>, DbErr> {
        hr_health_check::Entity::find()
            .order_by_desc(hr_health_check::Column::CheckedAt)
            .one(&self.db)
            .await
    }

    /// Runs a check immediately and then every `interval` until `shutdown` is cancelled.
    pub async fn run_periodically(self, interval: Duration, shutdown: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Starting HR health checks");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.run().await {
                        error!(error = %err, "Failed to record HR health check");
                    }
                }
            }
        }
        info!("HR health checks stopped");
    }
}
