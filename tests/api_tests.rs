//! End-to-end tests of the HTTP API over an in-memory database.

mod test_utils;

use attendance::server::create_app;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use test_utils::{TEST_TOKEN, TestApp, insert_employee};
use tower::ServiceExt;
use uuid::Uuid;

async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with_token(app, method, uri, body, Some(TEST_TOKEN)).await
}

async fn send_with_token(
    app: &TestApp,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = create_app(app.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn post_event(app: &TestApp, employee_id: Uuid, event_type: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/employees/{employee_id}/events"),
        Some(json!({ "event_type": event_type })),
    )
    .await
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let employee = insert_employee(&app.db, "Asha Rao", Some("1001"), None).await?;
    let uri = format!("/employees/{employee}/events");

    let (status, body) = send_with_token(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "event_type": "CLOCK_IN" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send_with_token(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "event_type": "CLOCK_IN" })),
        Some("not-a-token"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Nothing was written.
    assert!(app.notifier.notified().is_empty());
    Ok(())
}

#[tokio::test]
async fn public_routes_need_no_token() -> anyhow::Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = send_with_token(&app, Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "attendance-ledger");

    let (status, body) = send_with_token(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "database": "ok" }));

    let (status, body) = send_with_token(&app, Method::GET, "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/employees/{employee_id}/events"].is_object());
    Ok(())
}

#[tokio::test]
async fn clock_actions_follow_the_sequence_rules() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let employee = insert_employee(&app.db, "Asha Rao", Some("1001"), None).await?;

    app.at("2025-11-26", "09:00");
    let (status, body) = post_event(&app, employee, "CLOCK_IN").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["event_type"], "CLOCK_IN");
    assert_eq!(body["business_date_local"], "2025-11-26");
    assert_eq!(body["sequence"], 1);
    assert_eq!(body["daily_status"]["current_status"], "ON_SHIFT");
    assert!(body["sync_task_id"].is_string());

    app.at("2025-11-26", "09:05");
    let (status, body) = post_event(&app, employee, "CLOCK_IN").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DOUBLE_CLOCK_IN");
    assert_eq!(body["message"], "You have already clocked in for today.");

    let (status, body) = post_event(&app, employee, "BREAK_END").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "NO_OPEN_BREAK");

    app.at("2025-11-26", "17:30");
    let (status, body) = post_event(&app, employee, "CLOCK_OUT").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "EARLY_CLOCK_OUT");
    Ok(())
}

#[tokio::test]
async fn malformed_intake_is_rejected() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let employee = insert_employee(&app.db, "Asha Rao", Some("1001"), None).await?;
    let uri = format!("/employees/{employee}/events");

    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "event_type": "CLOCK_IN", "payload": [1, 2, 3] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, _) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "event_type": "CLOCK_IN", "actor": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        send(&app, Method::POST, &uri, Some(json!({ "event_type": "NAP" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let stranger = Uuid::new_v4();
    let (status, body) = post_event(&app, stranger, "CLOCK_IN").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn malformed_paths_and_queries_are_problem_responses() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let employee = insert_employee(&app.db, "Asha Rao", Some("1001"), None).await?;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/employees/{employee}/events?from=yesterday&to=2025-11-26"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["details"]["query"].is_string());

    let (status, body) = send(
        &app,
        Method::GET,
        "/employees/not-a-uuid/daily-status?from=2025-11-26&to=2025-11-26",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["details"]["path"].is_string());

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/employees/{employee}/days/26-11-2025/seal"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    Ok(())
}

#[tokio::test]
async fn events_and_daily_status_are_listed_by_range() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let employee = insert_employee(&app.db, "Asha Rao", Some("1001"), None).await?;

    app.at("2025-11-26", "09:00");
    post_event(&app, employee, "CLOCK_IN").await;
    app.at("2025-11-26", "11:00");
    post_event(&app, employee, "BREAK_START").await;
    app.at("2025-11-26", "11:20");
    post_event(&app, employee, "BREAK_END").await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/employees/{employee}/events?from=2025-11-26&to=2025-11-26"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["CLOCK_IN", "BREAK_START", "BREAK_END"]);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/employees/{employee}/daily-status?from=2025-11-20&to=2025-11-30"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let statuses = body["daily_statuses"].as_array().unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0]["break_minutes_used"], 20);
    assert_eq!(statuses[0]["current_status"], "ON_SHIFT");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/employees/{employee}/events?from=2025-11-27&to=2025-11-26"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    Ok(())
}

#[tokio::test]
async fn sealing_locks_the_day() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let employee = insert_employee(&app.db, "Asha Rao", Some("1001"), None).await?;

    app.at("2025-11-26", "09:00");
    post_event(&app, employee, "CLOCK_IN").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/employees/{employee}/days/2025-11-26/seal"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_status"], "LOCKED");

    app.at("2025-11-26", "19:30");
    let (status, body) = post_event(&app, employee, "CLOCK_OUT").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "PARTITION_SEALED");
    Ok(())
}

#[tokio::test]
async fn team_status_lists_reports_by_name() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let manager = insert_employee(&app.db, "Meera Iyer", Some("0001"), None).await?;
    let zara = insert_employee(&app.db, "Zara Khan", Some("1002"), Some(manager)).await?;
    let arjun = insert_employee(&app.db, "Arjun Das", Some("1003"), Some(manager)).await?;
    let intern = insert_employee(&app.db, "Nikhil Jain", None, Some(arjun)).await?;

    app.at("2025-11-26", "09:00");
    post_event(&app, zara, "CLOCK_IN").await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/managers/{manager}/team-status?date=2025-11-26"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["date"], "2025-11-26");

    let members = body["members"].as_array().unwrap();
    let names: Vec<&str> = members
        .iter()
        .map(|member| member["full_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Arjun Das", "Nikhil Jain", "Zara Khan"]);

    let zara_row = members
        .iter()
        .find(|member| member["employee_id"] == json!(zara))
        .unwrap();
    assert_eq!(zara_row["daily_status"]["current_status"], "ON_SHIFT");
    let intern_row = members
        .iter()
        .find(|member| member["employee_id"] == json!(intern))
        .unwrap();
    assert!(intern_row["daily_status"].is_null());

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/managers/{}/team-status?date=2025-11-26", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn integrity_audit_reports_a_clean_ledger() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let employee = insert_employee(&app.db, "Asha Rao", Some("1001"), None).await?;

    app.at("2025-11-26", "09:00");
    post_event(&app, employee, "CLOCK_IN").await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/audit/integrity?from=2025-11-25&to=2025-11-26",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["partitions_checked"], 1);
    assert_eq!(body["events_checked"], 1);
    assert_eq!(body["findings"], json!([]));
    Ok(())
}

#[tokio::test]
async fn sync_retry_is_limited_to_failed_deliveries() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let employee = insert_employee(&app.db, "New Joiner", None, None).await?;

    app.at("2025-11-26", "09:00");
    let (_, recorded) = post_event(&app, employee, "CLOCK_IN").await;
    let event_id = recorded["event_id"].as_str().unwrap().to_string();
    let retry_uri = format!("/events/{event_id}/sync/retry");

    // Still pending.
    let (status, body) = send(&app, Method::POST, &retry_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SYNC_NOT_RETRYABLE");

    // No attendance number, so the delivery is abandoned.
    app.state.pipeline.run_once().await?;

    let (status, body) = send(&app, Method::POST, &retry_uri, None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["event_id"], event_id.as_str());
    assert!(body["sync_task_id"].is_string());

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/events/{}/sync/retry", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
