use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use appointment_cell::handlers::AppointmentState;
use appointment_cell::models::{TABLE_APPOINTMENT, TABLE_USER_DATA};
use appointment_cell::router::cell_routes;
use shared_config::AppConfig;
use shared_database::{DocumentStore, MemoryStore};
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

struct TestApp {
    app: Router,
    store: Arc<MemoryStore>,
    config: Arc<AppConfig>,
}

fn create_test_app() -> TestApp {
    let config = TestConfig::default().to_arc();
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppointmentState::new(
        config.clone(),
        store.clone() as Arc<dyn DocumentStore>,
    ));
    TestApp { app: cell_routes(state), store, config }
}

async fn send(
    test_app: &TestApp,
    user: &TestUser,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", JwtTestUtils::bearer(user, &test_app.config))
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = test_app.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let test_app = create_test_app();

    let request = Request::builder()
        .method("GET")
        .uri("/appointments/doctor/d1")
        .body(Body::empty())
        .unwrap();
    let response = test_app.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let test_app = create_test_app();
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_expired_token(&user, &test_app.config.supabase_jwt_secret);

    let request = Request::builder()
        .method("GET")
        .uri(format!("/users/{}", user.id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = test_app.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_book_then_fetch_appointment() {
    let test_app = create_test_app();
    let patient = TestUser::patient("patient@example.com");
    let doctor = TestUser::doctor("doctor@example.com");
    test_app
        .store
        .set(TABLE_USER_DATA, "prof-doc", MockSupabaseResponses::user_profile(&doctor.id, "Dr Who", true))
        .await
        .unwrap();

    let when = (Utc::now() + Duration::days(2)).timestamp_millis();
    let (status, body) = send(
        &test_app,
        &patient,
        "POST",
        "/appointments",
        Some(MockSupabaseResponses::appointment(&patient.id, &doctor.id, when, "pending")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(&test_app, &patient, "GET", &format!("/appointments/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(id));
    assert_eq!(body["selected_date"], json!(when));
    assert_eq!(body["doctor_details"]["name"], json!("Dr Who"));
}

#[tokio::test]
async fn test_missing_appointment_is_not_found() {
    let test_app = create_test_app();
    let user = TestUser::patient("patient@example.com");

    let (status, body) = send(&test_app, &user, "GET", "/appointments/does-not-exist", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn test_patch_strips_doctor_details() {
    let test_app = create_test_app();
    let doctor = TestUser::doctor("doctor@example.com");
    test_app
        .store
        .set(TABLE_APPOINTMENT, "a1", MockSupabaseResponses::appointment("p1", &doctor.id, 1_000, "pending"))
        .await
        .unwrap();

    let mut update = MockSupabaseResponses::appointment("p1", &doctor.id, 1_000, "approved");
    update["doctor_details"] = MockSupabaseResponses::user_profile(&doctor.id, "Dr Who", true);

    let (status, body) = send(&test_app, &doctor, "PATCH", "/appointments/a1", Some(update)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["approval_status"], json!("approved"));

    let stored = test_app.store.get(TABLE_APPOINTMENT, "a1").await.unwrap().unwrap();
    assert!(stored.get("doctor_details").is_none());
    assert_eq!(stored.get("id"), Some(&json!("a1")));
}

#[tokio::test]
async fn test_doctor_day_listing_and_pending_range() {
    let test_app = create_test_app();
    let doctor = TestUser::doctor("doctor@example.com");
    for (id, ms, status) in [
        ("a1", 1_717_977_600_000_i64, "approved"),
        ("a2", 1_718_020_800_000_i64, "pending"),
        ("a3", 1_718_064_000_000_i64, "rejected"),
    ] {
        test_app
            .store
            .set(TABLE_APPOINTMENT, id, MockSupabaseResponses::appointment("p1", &doctor.id, ms, status))
            .await
            .unwrap();
    }

    let uri = format!("/appointments/doctor/{}/date?date=2024-06-10T00:00:00Z", doctor.id);
    let (status, body) = send(&test_app, &doctor, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(2));

    let uri = format!(
        "/appointments/doctor/{}/pending?start=2024-06-10T00:00:00Z&end=2024-06-11T00:00:00Z",
        doctor.id
    );
    let (status, body) = send(&test_app, &doctor, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointments"][0]["id"], json!("a2"));

    let uri = format!(
        "/appointments/doctor/{}/pending?start=2024-06-11T00:00:00Z&end=2024-06-10T00:00:00Z",
        doctor.id
    );
    let (status, _) = send(&test_app, &doctor, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upcoming_pages_follow_cursor() {
    let test_app = create_test_app();
    let patient = TestUser::patient("patient@example.com");
    let base = Utc::now() + Duration::days(1);
    for n in 0..5_i64 {
        let when = (base + Duration::hours(n)).timestamp_millis();
        test_app
            .store
            .set(TABLE_APPOINTMENT, &format!("u{n}"), MockSupabaseResponses::appointment(&patient.id, "d1", when, "approved"))
            .await
            .unwrap();
    }

    let uri = format!("/appointments/patient/{}/upcoming", patient.id);
    let (status, first) = send(&test_app, &patient, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let first_ids: Vec<&str> = first["data"].as_array().unwrap().iter().map(|a| a["id"].as_str().unwrap()).collect();
    assert_eq!(first_ids, vec!["u4", "u3", "u2"]);

    let cursor = first["next_cursor"].as_str().unwrap();
    let (status, second) = send(&test_app, &patient, "GET", &format!("{}?cursor={}", uri, cursor), None).await;
    assert_eq!(status, StatusCode::OK);
    let second_ids: Vec<&str> = second["data"].as_array().unwrap().iter().map(|a| a["id"].as_str().unwrap()).collect();
    assert_eq!(second_ids, vec!["u1", "u0"]);

    let (status, _) = send(&test_app, &patient, "GET", &format!("{}?cursor=not-a-cursor", uri), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_user_returns_empty_profile() {
    let test_app = create_test_app();
    let user = TestUser::patient("patient@example.com");

    let (status, body) = send(&test_app, &user, "GET", "/users/nobody", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], json!(""));
    assert_eq!(body["name"], json!(""));
}

#[tokio::test]
async fn test_push_token_update_uses_registration_token() {
    let test_app = create_test_app();
    let user = TestUser::patient("patient@example.com");
    test_app
        .store
        .set(TABLE_USER_DATA, "prof-1", MockSupabaseResponses::user_profile(&user.id, "Pat", false))
        .await
        .unwrap();

    let (status, body) = send(&test_app, &user, "GET", "/users/push-token", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token"], json!("test-push-token"));

    let uri = format!("/users/{}/push-token", user.id);
    let (status, body) = send(&test_app, &user, "PUT", &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], json!(true));

    let stored = test_app.store.get(TABLE_USER_DATA, "prof-1").await.unwrap().unwrap();
    assert_eq!(stored.get("token"), Some(&json!("test-push-token")));

    let (status, _) = send(&test_app, &user, "PUT", "/users/someone-else/push-token", Some(json!({ "token": "x" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_profiles_conflict() {
    let test_app = create_test_app();
    let user = TestUser::doctor("doctor@example.com");
    for doc in ["dup-1", "dup-2"] {
        test_app
            .store
            .set(TABLE_USER_DATA, doc, MockSupabaseResponses::user_profile("shared-id", "Twin", true))
            .await
            .unwrap();
    }

    let (status, _) = send(&test_app, &user, "GET", "/users/shared-id", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&test_app, &user, "GET", "/doctors/dup-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("Twin"));
}

#[tokio::test]
async fn test_store_outage_maps_to_server_error() {
    let test_app = create_test_app();
    let user = TestUser::patient("patient@example.com");
    test_app.store.fail_with("connection reset").await;

    let uri = format!("/appointments/patient/{}/history", user.id);
    let (status, _) = send(&test_app, &user, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
