//! # Authentication
//!
//! Operator bearer authentication for protected API endpoints.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, unauthorized_with_trace_id};
use crate::server::AppState;
use crate::telemetry::TraceContext;

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authentication middleware that validates bearer tokens
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Errors carry the request's trace id
    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let token = extract_bearer_token(request.headers()).map_err(|message| match &trace_id {
        Some(trace_id) => unauthorized_with_trace_id(Some(message), trace_id.clone()),
        None => unauthorized(Some(message)),
    })?;
    validate_token(&config, token)?;

    tracing::debug!("Authenticated operator request");
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    headers
        .get(AUTHORIZATION)
        .ok_or("Missing Authorization header")?
        .to_str()
        .map_err(|_| "Invalid Authorization header")?
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must use Bearer scheme")
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    fn create_test_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            operator_tokens: vec!["test-token-123".to_string()],
            ..Default::default()
        })
    }

    async fn run_middleware(config: Arc<AppConfig>, request: Request<Body>) -> Response {
        async fn handler() -> &'static str {
            "OK"
        }

        Router::new()
            .route("/test", get(handler))
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(&config),
                auth_middleware,
            ))
            .oneshot(request)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn missing_auth_header_returns_401() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = run_middleware(create_test_config(), request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_auth_scheme_returns_401() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Basic dGVzdDoxMjM=")
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(create_test_config(), request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_token_returns_401() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer wrong-token")
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(create_test_config(), request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_request_passes_through() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer test-token-123")
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(create_test_config(), request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn multiple_tokens_supported() {
        let config = Arc::new(AppConfig {
            operator_tokens: vec!["token-one".to_string(), "token-two".to_string()],
            ..Default::default()
        });

        for candidate in ["token-one", "token-two"] {
            let request = Request::builder()
                .uri("/test")
                .header("Authorization", format!("Bearer {}", candidate))
                .body(Body::empty())
                .unwrap();

            let response = run_middleware(Arc::clone(&config), request).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
