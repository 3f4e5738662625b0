//! Test utilities for database testing.
//!
//! In-memory SQLite with every migration applied, fixture helpers and fake collaborators
//! for the sync pipeline.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use attendance::clock::FixedClock;
use attendance::config::{AppConfig, HrPushConfig, SyncConfig};
use attendance::db;
use attendance::models::employee;
use attendance::server::AppState;
use attendance::sync::{
    EmployeeTableResolver, HrPushClient, PushError, PushRequest, PushResponse, RefreshNotifier,
    SyncCollaborators,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use uuid::Uuid;

pub const TEST_TOKEN: &str = "test-operator-token";
pub const TEST_DEVICE: &str = "TEST-DEVICE-01";

/// Configuration used by every integration test: in-memory SQLite, no retry jitter and a
/// short push timeout.
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        operator_tokens: vec![TEST_TOKEN.to_string()],
        sync: SyncConfig {
            backoff_jitter: 0.0,
            push_timeout_seconds: 1,
            ..SyncConfig::default()
        },
        hr_push: HrPushConfig {
            base_url: None,
            api_key: None,
            device_id: Some(TEST_DEVICE.to_string()),
        },
        ..AppConfig::default()
    }
}

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = db::init_pool(&test_config()).await?;
    db::run_migrations(&db).await?;
    Ok(db)
}

/// Inserts an employee and returns its id.
pub async fn insert_employee(
    db: &DatabaseConnection,
    full_name: &str,
    attendance_number: Option<&str>,
    manager_id: Option<Uuid>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    employee::ActiveModel {
        id: Set(id),
        full_name: Set(full_name.to_string()),
        email: Set(None),
        external_attendance_number: Set(attendance_number.map(str::to_string)),
        manager_id: Set(manager_id),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await?;
    Ok(id)
}

pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

/// UTC instant of a local wall-clock time under the +05:30 test calendar.
pub fn local(day: &str, time: &str) -> DateTime<Utc> {
    let time = NaiveTime::parse_from_str(time, "%H:%M").unwrap();
    let offset = chrono::FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
    offset
        .from_local_datetime(&date(day).and_time(time))
        .unwrap()
        .with_timezone(&Utc)
}

/// Push client that replays scripted outcomes and records every request. Once the script
/// is exhausted every push is accepted.
#[derive(Debug, Default)]
pub struct ScriptedPushClient {
    script: Mutex<VecDeque<Result<PushResponse, PushError>>>,
    requests: Mutex<Vec<PushRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedPushClient {
    pub fn push_outcome(&self, outcome: Result<PushResponse, PushError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn fail_times(&self, times: usize, error: PushError) {
        for _ in 0..times {
            self.push_outcome(Err(error.clone()));
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<PushRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn accepted() -> PushResponse {
        PushResponse {
            status: 200,
            body: serde_json::json!({ "succeeded": true }),
        }
    }
}

#[async_trait]
impl HrPushClient for ScriptedPushClient {
    async fn push(&self, request: &PushRequest) -> Result<PushResponse, PushError> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Self::accepted()))
    }
}

/// Notifier that remembers every call.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<Uuid>>,
}

impl RecordingNotifier {
    pub fn notified(&self) -> Vec<Uuid> {
        self.notified.lock().unwrap().clone()
    }

    pub fn count_for(&self, employee_id: Uuid) -> usize {
        self.notified()
            .into_iter()
            .filter(|id| *id == employee_id)
            .count()
    }
}

impl RefreshNotifier for RecordingNotifier {
    fn notify(&self, employee_id: Uuid) {
        self.notified.lock().unwrap().push(employee_id);
    }
}

/// Fully wired application over an in-memory database with fake collaborators.
pub struct TestApp {
    pub db: DatabaseConnection,
    pub clock: FixedClock,
    pub push: Arc<ScriptedPushClient>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Result<Self> {
        let db = db::init_pool(&config).await?;
        db::run_migrations(&db).await?;

        let clock = FixedClock::new(local("2025-11-26", "08:00"));
        let push = Arc::new(ScriptedPushClient::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let collaborators = SyncCollaborators {
            push: push.clone(),
            identity: Arc::new(EmployeeTableResolver::new(db.clone())),
            notifier: notifier.clone(),
            clock: Arc::new(clock.clone()),
        };
        let state = AppState::new(Arc::new(config), db.clone(), collaborators)?;

        Ok(Self {
            db,
            clock,
            push,
            notifier,
            state,
        })
    }

    /// Moves the clock to a local wall-clock time on `day`.
    pub fn at(&self, day: &str, time: &str) {
        self.clock.set(local(day, time));
    }
}
