//! Telemetry utilities: global subscriber setup, request-scoped trace metadata and the
//! names of the metrics the service records.

use std::any::type_name_of_val;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use log::LevelFilter;
use thiserror::Error;
use tokio::task_local;
use tracing::Instrument;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};
use uuid::Uuid;

use crate::config::AppConfig;

/// Metric names recorded through the `metrics` facade.
pub mod metric_names {
    /// Counter labelled by `event_type`.
    pub const EVENTS_APPENDED: &str = "attendance_events_appended_total";
    /// Counter labelled by `violation`.
    pub const EVENTS_REJECTED: &str = "attendance_events_rejected_total";
    /// Counter labelled by `outcome`.
    pub const SYNC_ATTEMPTS: &str = "attendance_sync_attempts_total";
    pub const SYNC_PUSH_DURATION_MS: &str = "attendance_sync_push_duration_ms";
    /// Counter labelled by `outcome`.
    pub const HR_HEALTH_CHECKS: &str = "attendance_hr_health_checks_total";
}

/// Header carrying the request correlation ID in and out of the service.
pub static TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

/// Trace context containing request correlation ID.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

impl TraceContext {
    pub fn generate() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
        }
    }
}

task_local! {
    static ACTIVE_TRACE_CONTEXT: TraceContext;
}

/// Errors that can occur while initializing global telemetry.
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize global tracing/logging exactly once, wiring `log::` records (sqlx, SeaORM)
/// into the tracing pipeline.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        // Another component may already have registered the bridge.
        let logger_type = type_name_of_val(log::logger());
        if !logger_type.contains("LogTracer") {
            eprintln!(
                "Warning: Failed to install log tracer bridge: {}. `log::` records will not reach tracing.",
                err
            );
        }
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().json().with_current_span(true).boxed(),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
        eprintln!(
            "Warning: Failed to set global tracing subscriber: {}. Default subscriber remains in effect.",
            err
        );
    }

    Ok(())
}

/// Execute `future` within the provided trace context, making it available through task-local
/// storage for the duration of the request.
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_TRACE_CONTEXT.scope(context, future).await
}

/// Get the currently active trace ID, if one has been set for the running task.
pub fn current_trace_id() -> Option<String> {
    ACTIVE_TRACE_CONTEXT
        .try_with(|ctx| ctx.trace_id.clone())
        .ok()
}

/// Middleware that adopts the caller's `x-trace-id` (or generates one), exposes it to
/// handlers and error responses, and echoes it on the response.
pub async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let context = request
        .headers()
        .get(&TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(|value| TraceContext {
            trace_id: value.to_string(),
        })
        .unwrap_or_else(TraceContext::generate);

    request.extensions_mut().insert(context.clone());
    let span = tracing::info_span!(
        "http_request",
        trace_id = %context.trace_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let trace_id = context.trace_id.clone();
    let mut response = with_trace_context(context, next.run(request).instrument(span)).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER.clone(), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trace_id_is_visible_inside_scope_only() {
        assert!(current_trace_id().is_none());

        let seen = with_trace_context(
            TraceContext {
                trace_id: "abc123".to_string(),
            },
            async { current_trace_id() },
        )
        .await;

        assert_eq!(seen.as_deref(), Some("abc123"));
        assert!(current_trace_id().is_none());
    }

    #[test]
    fn init_is_idempotent() {
        let config = AppConfig::default();
        init_tracing(&config).unwrap();
        init_tracing(&config).unwrap();
    }
}
