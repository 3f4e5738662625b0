//! Push client for the external HR attendance log API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use url::Url;

use crate::config::HrPushConfig;
use crate::models::AttendanceEventType;

/// Status code the external system uses for each pushed event type. Lunch events are not
/// part of the external vocabulary.
pub fn external_status_code(event_type: AttendanceEventType) -> Option<u8> {
    match event_type {
        AttendanceEventType::ClockIn => Some(0),
        AttendanceEventType::ClockOut => Some(1),
        AttendanceEventType::BreakStart => Some(2),
        AttendanceEventType::BreakEnd => Some(3),
        AttendanceEventType::LunchStart | AttendanceEventType::LunchEnd => None,
    }
}

/// One attendance log entry in the external wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushRequest {
    pub device_identifier: String,
    pub employee_attendance_number: String,
    /// Local wall-clock time, `YYYY-MM-DDTHH:MM:SS`, no offset
    pub timestamp: String,
    pub status: u8,
}

/// Attendance number of the canary entry sent by reachability checks. It matches no
/// employee, so the HR system accepts it without recording a punch.
pub const HEALTH_CANARY_ATTENDANCE_NUMBER: &str = "TEST_HEALTH";

impl PushRequest {
    /// Request body; the API takes a batch, we always send one entry.
    pub fn body(&self) -> JsonValue {
        json!([self])
    }

    pub fn health_canary(device_identifier: &str) -> Self {
        Self {
            device_identifier: device_identifier.to_string(),
            employee_attendance_number: HEALTH_CANARY_ATTENDANCE_NUMBER.to_string(),
            timestamp: "2025-01-01T00:00:00".to_string(),
            status: 0,
        }
    }
}

/// Reply to an accepted push.
#[derive(Debug, Clone, PartialEq)]
pub struct PushResponse {
    pub status: u16,
    pub body: JsonValue,
}

/// Failure of a push call.
#[derive(Debug, Clone, Error)]
pub enum PushError {
    #[error("push timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("HR system returned server error {status}")]
    Server { status: u16, body: JsonValue },
    #[error("HR system rate limited the push (status {status})")]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
        body: JsonValue,
    },
    #[error("HR system rejected the push with status {status}")]
    Rejected { status: u16, body: JsonValue },
    #[error("HR system did not accept the log entry")]
    NotAccepted { status: u16, body: JsonValue },
    #[error("push client misconfigured: {0}")]
    Configuration(String),
}

impl PushError {
    /// Timeouts, network failures, 5xx and 429 are worth retrying; everything else will
    /// fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PushError::Timeout(_)
                | PushError::Network(_)
                | PushError::Server { .. }
                | PushError::RateLimited { .. }
        )
    }

    /// Server-suggested delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PushError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status, when the HR system answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            PushError::Server { status, .. }
            | PushError::RateLimited { status, .. }
            | PushError::Rejected { status, .. }
            | PushError::NotAccepted { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw reply body, when the HR system answered at all.
    pub fn response_body(&self) -> Option<&JsonValue> {
        match self {
            PushError::Server { body, .. }
            | PushError::RateLimited { body, .. }
            | PushError::Rejected { body, .. }
            | PushError::NotAccepted { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Stable label used in metrics and stored error details.
    pub fn kind(&self) -> &'static str {
        match self {
            PushError::Timeout(_) => "timeout",
            PushError::Network(_) => "network",
            PushError::Server { .. } => "server_error",
            PushError::RateLimited { .. } => "rate_limited",
            PushError::Rejected { .. } => "rejected",
            PushError::NotAccepted { .. } => "not_accepted",
            PushError::Configuration(_) => "configuration",
        }
    }
}

/// Delivers one log entry to the HR system. Pushing the same entry twice is safe: the
/// receiver de-duplicates on identity and timestamp.
#[async_trait]
pub trait HrPushClient: Send + Sync + fmt::Debug {
    async fn push(&self, request: &PushRequest) -> Result<PushResponse, PushError>;

    /// Pushes the health canary and reports whether ingestion accepted it.
    async fn check_reachability(&self, device_identifier: &str) -> Result<PushResponse, PushError> {
        self.push(&PushRequest::health_canary(device_identifier)).await
    }
}

/// `reqwest` implementation posting to `{base_url}/v1/logs`.
#[derive(Debug, Clone)]
pub struct HttpHrPushClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpHrPushClient {
    pub fn new(config: &HrPushConfig, timeout: Duration) -> Result<Self, PushError> {
        let base = config
            .base_url
            .as_deref()
            .ok_or_else(|| PushError::Configuration("HR push base URL is not set".to_string()))?;
        // Keep any path prefix on the base URL when joining.
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        let endpoint = Url::parse(&base)
            .and_then(|url| url.join("v1/logs"))
            .map_err(|err| PushError::Configuration(format!("invalid base URL '{base}': {err}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| PushError::Configuration(err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl HrPushClient for HttpHrPushClient {
    async fn push(&self, request: &PushRequest) -> Result<PushResponse, PushError> {
        let mut builder = self.client.post(self.endpoint.clone()).json(&request.body());
        if let Some(api_key) = &self.api_key {
            builder = builder.header("X-API-Key", api_key);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                PushError::Timeout(self.timeout)
            } else {
                PushError::Network(err.to_string())
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response
            .text()
            .await
            .map_err(|err| PushError::Network(err.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or(JsonValue::String(text));

        classify(status, retry_after, body)
    }
}

fn classify(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: JsonValue,
) -> Result<PushResponse, PushError> {
    let code = status.as_u16();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PushError::RateLimited {
            status: code,
            retry_after,
            body,
        });
    }
    if status.is_server_error() {
        return Err(PushError::Server { status: code, body });
    }
    if !status.is_success() {
        return Err(PushError::Rejected { status: code, body });
    }
    if body.get("succeeded").and_then(JsonValue::as_bool) == Some(false) {
        return Err(PushError::NotAccepted { status: code, body });
    }
    Ok(PushResponse { status: code, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_punch_events_have_external_codes() {
        assert_eq!(external_status_code(AttendanceEventType::ClockIn), Some(0));
        assert_eq!(external_status_code(AttendanceEventType::ClockOut), Some(1));
        assert_eq!(external_status_code(AttendanceEventType::BreakStart), Some(2));
        assert_eq!(external_status_code(AttendanceEventType::BreakEnd), Some(3));
        assert_eq!(external_status_code(AttendanceEventType::LunchStart), None);
        assert_eq!(external_status_code(AttendanceEventType::LunchEnd), None);
    }

    #[test]
    fn body_uses_external_field_names() {
        let request = PushRequest {
            device_identifier: "device-1".to_string(),
            employee_attendance_number: "E-42".to_string(),
            timestamp: "2025-11-25T09:00:00".to_string(),
            status: 0,
        };

        assert_eq!(
            request.body(),
            json!([{
                "DeviceIdentifier": "device-1",
                "EmployeeAttendanceNumber": "E-42",
                "Timestamp": "2025-11-25T09:00:00",
                "Status": 0
            }])
        );
    }

    #[test]
    fn classification_splits_transient_from_permanent() {
        let server = classify(StatusCode::BAD_GATEWAY, None, json!({})).unwrap_err();
        assert!(server.is_transient());

        let limited = classify(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(7)),
            json!({}),
        )
        .unwrap_err();
        assert!(limited.is_transient());
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));

        let rejected = classify(StatusCode::BAD_REQUEST, None, json!({"error": "bad"})).unwrap_err();
        assert!(!rejected.is_transient());
        assert_eq!(rejected.response_body(), Some(&json!({"error": "bad"})));

        let refused = classify(StatusCode::OK, None, json!({"succeeded": false})).unwrap_err();
        assert_eq!(refused.kind(), "not_accepted");
        assert_eq!(refused.status(), Some(200));
        assert_eq!(PushError::Network("reset".to_string()).status(), None);
        assert!(!refused.is_transient());

        let accepted = classify(StatusCode::OK, None, json!({"succeeded": true})).unwrap();
        assert_eq!(accepted.status, 200);
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let client = HttpHrPushClient::new(
            &HrPushConfig {
                base_url: Some("https://hr.example.com/ingest".to_string()),
                ..HrPushConfig::default()
            },
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            client.endpoint().as_str(),
            "https://hr.example.com/ingest/v1/logs"
        );
    }

    #[test]
    fn endpoint_is_joined_onto_base_url() {
        let client = HttpHrPushClient::new(
            &HrPushConfig {
                base_url: Some("https://hr.example.com/".to_string()),
                api_key: Some("key".to_string()),
                device_id: Some("device-1".to_string()),
            },
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(client.endpoint().as_str(), "https://hr.example.com/v1/logs");
    }
}
