//! # Server Configuration
//!
//! Application state, router and OpenAPI document for the attendance ledger API.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::{AppConfig, ConfigError};
use crate::handlers;
use crate::ledger::{AttendanceLedger, SequenceRules};
use crate::projection::DailyStatusProjector;
use crate::reporting::AttendanceReports;
use crate::sync::{HrHealthCheck, SyncCollaborators, SyncPipeline, SyncSettings, SyncTaskQueue};
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub ledger: AttendanceLedger,
    pub reports: AttendanceReports,
    pub pipeline: SyncPipeline,
    pub health: HrHealthCheck,
}

impl AppState {
    /// Wires the ledger, the reports, the sync pipeline and the HR health check around one
    /// database handle and one task queue.
    pub fn new(
        config: Arc<AppConfig>,
        db: DatabaseConnection,
        collaborators: SyncCollaborators,
    ) -> Result<Self, ConfigError> {
        let calendar = config.calendar()?;
        let projector = DailyStatusProjector::new(calendar, config.late_cutoff_time()?);
        let rules = SequenceRules {
            calendar,
            min_clock_out_local: config.min_clock_out_time()?,
        };
        let queue = SyncTaskQueue::new();

        let ledger = AttendanceLedger::new(
            db.clone(),
            Arc::clone(&collaborators.clock),
            rules,
            projector,
            queue.clone(),
            Arc::clone(&collaborators.notifier),
        );
        let reports = AttendanceReports::new(db.clone(), calendar, Arc::clone(&collaborators.clock));
        let settings = SyncSettings::from_config(&config);
        let health = HrHealthCheck::new(
            db.clone(),
            Arc::clone(&collaborators.push),
            Arc::clone(&collaborators.clock),
            settings.device_id.clone(),
            settings.push_timeout,
        );
        let pipeline = SyncPipeline::new(db.clone(), queue, projector, settings, collaborators);

        Ok(Self {
            config,
            db,
            ledger,
            reports,
            pipeline,
            health,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/employees/{employee_id}/events",
            post(handlers::events::record_event).get(handlers::events::list_events),
        )
        .route(
            "/employees/{employee_id}/daily-status",
            get(handlers::daily_status::list_daily_status),
        )
        .route(
            "/employees/{employee_id}/days/{date}/seal",
            post(handlers::daily_status::seal_day),
        )
        .route(
            "/managers/{manager_id}/team-status",
            get(handlers::team::team_status),
        )
        .route("/audit/integrity", get(handlers::audit::integrity_audit))
        .route(
            "/events/{event_id}/sync/retry",
            post(handlers::sync::retry_sync),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware))
}

/// Serves the API until `shutdown` is cancelled.
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = state
        .config
        .bind_addr()
        .context("Invalid server address")?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

struct BearerAuthAddon;

impl Modify for BearerAuthAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::events::record_event,
        crate::handlers::events::list_events,
        crate::handlers::daily_status::list_daily_status,
        crate::handlers::daily_status::seal_day,
        crate::handlers::team::team_status,
        crate::handlers::audit::integrity_audit,
        crate::handlers::sync::retry_sync,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::AttendanceEventType,
            crate::models::SyncStatus,
            crate::error::ApiError,
            crate::ledger::RecordedEvent,
            crate::projection::CurrentStatus,
            crate::projection::DailyStatusSnapshot,
            crate::reporting::EventView,
            crate::reporting::TeamMemberStatus,
            crate::reporting::IntegrityFinding,
            crate::reporting::IntegrityReport,
            crate::handlers::HealthResponse,
            crate::handlers::events::RecordEventRequest,
            crate::handlers::events::EventsResponse,
            crate::handlers::daily_status::DailyStatusResponse,
            crate::handlers::team::TeamStatusResponse,
            crate::handlers::sync::RetrySyncResponse,
        )
    ),
    modifiers(&BearerAuthAddon),
    info(
        title = "Attendance Ledger API",
        description = "Clock-action intake, daily status and HR sync operations",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
