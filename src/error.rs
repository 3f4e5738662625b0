//! # Error Handling
//!
//! Unified problem+json error responses for the attendance API, with trace ID propagation
//! and the mapping of ledger rejections to user-presentable messages.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::ledger::{LedgerError, LedgerViolation};
use crate::reporting::ReportError;
use crate::sync::RetryEventError;
use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                // Fallback: generate a correlation ID for basic client-server log correlation
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Driver-level error code (SQLSTATE on Postgres, extended result code on SQLite).
fn database_error_code(error: &sea_orm::DbErr) -> Option<String> {
    use sea_orm::RuntimeErr;

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Conn(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return None,
    };

    runtime_err
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .map(|code| code.into_owned())
}

/// True when `error` is a unique-constraint violation on Postgres or SQLite.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_ref()))
}

/// True when a transaction was aborted because a concurrent transaction held the lock it
/// needed: Postgres serialization failures and deadlocks, SQLite `BUSY` and `LOCKED`
/// (including their extended codes). Retrying the whole transaction is safe.
pub fn is_transaction_conflict(error: &sea_orm::DbErr) -> bool {
    const PG_CONFLICT_CODES: &[&str] = &["40001", "40P01"];
    const SQLITE_BUSY: i32 = 5;
    const SQLITE_LOCKED: i32 = 6;

    let Some(code) = database_error_code(error) else {
        return false;
    };
    if PG_CONFLICT_CODES.contains(&code.as_str()) {
        return true;
    }
    // SQLSTATEs are five characters; SQLite result codes are shorter integers.
    code.len() < 5
        && code
            .parse::<i32>()
            .is_ok_and(|value| matches!(value & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Bad Request")]
    BadRequest,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not Found")]
    NotFound,
    #[error("Conflict")]
    Conflict,
    #[error("Internal Server Error")]
    InternalServerError,
    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Conflict => StatusCode::CONFLICT,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code string for this error type in SCREAMING_SNAKE_CASE
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "VALIDATION_FAILED",
            ErrorType::Unauthorized => "UNAUTHORIZED",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::Conflict => "CONFLICT",
            ErrorType::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        // Add Retry-After header if present
        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        Self::new(
            error_type.status_code(),
            error_type.error_code(),
            &error_type.to_string(),
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        validation_error(
            "Invalid query parameters",
            json!({ "query": rejection.body_text() }),
        )
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        validation_error(
            "Invalid path parameters",
            json!({ "path": rejection.body_text() }),
        )
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Query(query_err) => {
                tracing::error!("Database query error: {:?}", query_err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
            sea_orm::DbErr::Exec(exec_err) => {
                tracing::error!("Database execution error: {:?}", exec_err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<LedgerViolation> for ApiError {
    fn from(violation: LedgerViolation) -> Self {
        let status = match violation {
            LedgerViolation::DoubleClockIn => StatusCode::CONFLICT,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let details = match &violation {
            LedgerViolation::EarlyClockOut {
                local_time,
                minimum,
            } => Some(json!({
                "local_time": local_time.format("%H:%M").to_string(),
                "minimum_local_time": minimum.format("%H:%M").to_string(),
            })),
            LedgerViolation::OutOfOrderEvent { latest, attempted } => Some(json!({
                "latest_event_timestamp_utc": latest,
                "attempted_timestamp_utc": attempted,
            })),
            _ => None,
        };

        let error = ApiError::new(status, violation.code(), &violation.to_string());
        match details {
            Some(details) => error.with_details(details),
            None => error,
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Violation(violation) => violation.into(),
            LedgerError::UnknownEmployee(employee_id) => not_found(&format!(
                "Employee {employee_id} does not exist"
            )),
            LedgerError::Contention { attempts } => {
                tracing::warn!(attempts, "Append gave up after repeated conflicts");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "APPEND_CONTENDED",
                    "The attendance record is busy, please retry",
                )
                .with_retry_after(1)
            }
            LedgerError::Database(db_err) => db_err.into(),
        }
    }
}

impl From<RetryEventError> for ApiError {
    fn from(error: RetryEventError) -> Self {
        match error {
            RetryEventError::EventNotFound(event_id) => {
                not_found(&format!("Attendance event {event_id} does not exist"))
            }
            RetryEventError::NotRetryable { status, .. } => ApiError::new(
                StatusCode::CONFLICT,
                "SYNC_NOT_RETRYABLE",
                &format!("Only failed deliveries can be retried; current status is {status}"),
            ),
            RetryEventError::Database(db_err) => db_err.into(),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(error: ReportError) -> Self {
        match error {
            ReportError::InvertedRange { from, to } => validation_error(
                "Invalid date range",
                json!({ "from": from, "to": to, "reason": "from must not be after to" }),
            ),
            ReportError::RangeTooLong => validation_error(
                "Invalid date range",
                json!({ "reason": error.to_string() }),
            ),
            ReportError::UnknownEmployee(employee_id) => {
                not_found(&format!("Employee {employee_id} does not exist"))
            }
            ReportError::Corrupt(err) => {
                tracing::error!(error = %err, "Unreadable row in report");
                ErrorType::InternalServerError.into()
            }
            ReportError::Database(db_err) => db_err.into(),
        }
    }
}

/// Create a not found error (404)
pub fn not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create an unauthorized error (401) with explicit trace_id
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    let mut error = ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg);
    error.trace_id = Some(trace_id.into_boxed_str());
    error
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
        assert_eq!(error.retry_after, None);
    }

    #[test]
    fn test_api_error_with_details() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", "Test error message")
            .with_details(json!({"field": "value"}));

        assert_eq!(error.details, Some(Box::new(json!({"field": "value"}))));
    }

    #[test]
    fn test_api_error_with_retry_after() {
        let error = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "TOO_MANY_REQUESTS",
            "Rate limit exceeded",
        )
        .with_retry_after(60);

        assert_eq!(error.retry_after, Some(60));
    }

    #[test]
    fn test_error_type_mapping() {
        let not_found_error: ApiError = ErrorType::NotFound.into();
        assert_eq!(not_found_error.code, Box::from("NOT_FOUND"));
        assert_eq!(not_found_error.message, Box::from("Not Found"));
    }

    #[test]
    fn test_content_type_header() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Test error");

        let response = error.into_response();

        // Check that Content-Type header is set correctly
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_retry_after_header() {
        let error = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Rate limit exceeded",
        )
        .with_retry_after(60);

        let response = error.into_response();

        // Check that Retry-After header is set
        assert_eq!(response.headers().get("retry-after").unwrap(), "60");

        // Check that Content-Type is still set
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_status_code_preservation() {
        let error = ApiError::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");

        let response = error.into_response();

        // Check that the status code is preserved
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_trace_id_generation() {
        let error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Test error",
        );

        // Check that trace ID is generated and has the expected format
        assert!(error.trace_id.is_some());
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13); // "corr-" + 8 chars
    }

    #[test]
    fn test_database_error_mapping() {
        let db_error = sea_orm::DbErr::RecordNotFound("test_record".to_string());
        let api_error: ApiError = db_error.into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.code, Box::from("NOT_FOUND"));
        assert!(api_error.message.contains("test_record"));
    }

    #[test]
    fn test_auth_error_helpers() {
        // Test unauthorized error
        let auth_error = unauthorized(None);
        assert_eq!(auth_error.status, StatusCode::UNAUTHORIZED);
        assert_eq!(auth_error.code, Box::from("UNAUTHORIZED"));
        assert_eq!(auth_error.message, Box::from("Authentication required"));

        // Test unauthorized error with custom message
        let custom_auth_error = unauthorized(Some("Invalid token"));
        assert_eq!(custom_auth_error.message, Box::from("Invalid token"));
    }

    #[test]
    fn test_validation_error_with_details() {
        let field_errors = json!({
            "name": "Name is required",
            "email": "Invalid email format"
        });

        let validation_error = validation_error("Validation failed", field_errors.clone());

        assert_eq!(validation_error.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation_error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(validation_error.message, Box::from("Validation failed"));
        assert_eq!(validation_error.details, Some(Box::new(field_errors)));
    }

    #[test]
    fn double_clock_in_is_a_conflict() {
        let error: ApiError = LedgerViolation::DoubleClockIn.into();

        assert_eq!(error.status, StatusCode::CONFLICT);
        assert_eq!(error.code, Box::from("DOUBLE_CLOCK_IN"));
        assert_eq!(
            error.message,
            Box::from("You have already clocked in for today.")
        );
    }

    #[test]
    fn other_violations_are_unprocessable() {
        let early: ApiError = LedgerViolation::EarlyClockOut {
            local_time: chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            minimum: chrono::NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        }
        .into();
        assert_eq!(early.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(early.code, Box::from("EARLY_CLOCK_OUT"));
        let details = early.details.unwrap();
        assert_eq!(details["minimum_local_time"], "19:00");

        let no_break: ApiError = LedgerViolation::NoOpenBreak.into();
        assert_eq!(no_break.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(no_break.code, Box::from("NO_OPEN_BREAK"));
        assert!(no_break.details.is_none());

        let sealed: ApiError = LedgerError::Violation(LedgerViolation::PartitionSealed).into();
        assert_eq!(sealed.code, Box::from("PARTITION_SEALED"));
    }

    #[test]
    fn unknown_employee_is_not_found() {
        let error: ApiError = LedgerError::UnknownEmployee(uuid::Uuid::nil()).into();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert!(error.message.contains("00000000-0000-0000-0000-000000000000"));
    }
}
