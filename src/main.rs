//! # Attendance Ledger Entry Point
//!
//! `serve` runs the HTTP API together with the sync workers, `worker` runs the sync workers
//! alone, `migrate` applies the schema, `audit` prints an integrity report and
//! `health-check` records one reachability check against the HR endpoint.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use attendance::{
    clock::{Clock, SystemClock},
    config::{AppConfig, ConfigLoader},
    db,
    reporting::AttendanceReports,
    server::{AppState, run_server},
    sync::{
        CoalescingNotifier, EmployeeTableResolver, HrHealthCheck, HrPushClient, HttpHrPushClient,
        PushError, PushRequest, PushResponse, SyncCollaborators, SyncSettings, sink_from_config,
    },
    telemetry,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "attendance", version, about = "Attendance ledger service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API and run the sync workers
    Serve,
    /// Run the sync workers only
    Worker,
    /// Apply pending database migrations
    Migrate,
    /// Print an integrity report for a business-date range as JSON
    Audit {
        /// First business date (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// Last business date (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
    },
    /// Check that the HR ingestion endpoint accepts entries and record the result
    HealthCheck,
}

/// Stand-in push client used when no HR endpoint is configured. Workers are not started
/// in that case, so it is never called by the pipeline.
#[derive(Debug)]
struct UnconfiguredPushClient;

#[async_trait]
impl HrPushClient for UnconfiguredPushClient {
    async fn push(&self, _request: &PushRequest) -> Result<PushResponse, PushError> {
        Err(PushError::Configuration(
            "HR push base URL is not set".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load().context("loading configuration")?;
    config.validate().context("validating configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;

    if let Ok(redacted_json) = config.redacted_json() {
        tracing::info!(profile = %config.profile, config = %redacted_json, "Loaded configuration");
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    match cli.command {
        Command::Migrate => db::run_migrations(&db).await,
        Command::Audit { from, to } => audit(config, db, from, to).await,
        Command::HealthCheck => health_check(config, db).await,
        Command::Serve => serve(config, db, true).await,
        Command::Worker => serve(config, db, false).await,
    }
}

async fn serve(config: AppConfig, db: DatabaseConnection, with_api: bool) -> Result<()> {
    if matches!(config.profile.as_str(), "local" | "test") {
        db::run_migrations(&db).await?;
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let push: Option<Arc<dyn HrPushClient>> = match config.hr_push.base_url {
        Some(_) => Some(Arc::new(
            HttpHrPushClient::new(&config.hr_push, config.sync.push_timeout())
                .context("building HR push client")?,
        )),
        None => None,
    };
    if push.is_none() && !with_api {
        bail!("ATTENDANCE_HR_PUSH_BASE_URL must be set to run sync workers");
    }

    let (notifier, notifier_task) =
        CoalescingNotifier::spawn(sink_from_config(&config.refresh), shutdown.clone());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let collaborators = SyncCollaborators {
        push: push
            .clone()
            .unwrap_or_else(|| Arc::new(UnconfiguredPushClient)),
        identity: Arc::new(EmployeeTableResolver::new(db.clone())),
        notifier: Arc::new(notifier),
        clock,
    };
    let state = AppState::new(Arc::new(config), db, collaborators)
        .context("building application state")?;

    let workers = if push.is_some() {
        Some(tokio::spawn(state.pipeline.clone().run(shutdown.clone())))
    } else {
        tracing::warn!("HR push is not configured; events stay queued until it is");
        None
    };
    let health_checks = match (&push, state.config.sync.health_check_interval()) {
        (Some(_), Some(interval)) => Some(tokio::spawn(
            state.health.clone().run_periodically(interval, shutdown.clone()),
        )),
        _ => None,
    };

    if with_api {
        run_server(state, shutdown.clone()).await?;
    } else {
        shutdown.cancelled().await;
    }

    shutdown.cancel();
    if let Some(workers) = workers {
        workers.await.context("sync workers panicked")?;
    }
    if let Some(health_checks) = health_checks {
        health_checks.await.context("HR health checks panicked")?;
    }
    notifier_task.await.context("refresh notifier panicked")?;
    Ok(())
}

async fn audit(config: AppConfig, db: DatabaseConnection, from: NaiveDate, to: NaiveDate) -> Result<()> {
    let reports = AttendanceReports::new(db, config.calendar()?, Arc::new(SystemClock));
    let report = reports
        .integrity_audit(from, to)
        .await
        .context("running integrity audit")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_clean() {
        std::process::exit(2);
    }
    Ok(())
}

async fn health_check(config: AppConfig, db: DatabaseConnection) -> Result<()> {
    let settings = SyncSettings::from_config(&config);
    let push = HttpHrPushClient::new(&config.hr_push, settings.push_timeout)
        .context("building HR push client")?;
    let check = HrHealthCheck::new(
        db,
        Arc::new(push),
        Arc::new(SystemClock),
        settings.device_id,
        settings.push_timeout,
    );
    let result = check.run().await.context("recording HR health check")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.ingestion_ok {
        std::process::exit(2);
    }
    Ok(())
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown requested");
    shutdown.cancel();
}
