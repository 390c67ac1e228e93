use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{Cursor, Direction, DocumentStore, Query, SupabaseClient};

fn config_for(server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_jwt_secret: "test-secret".to_string(),
        supabase_service_key: Some("service-key".to_string()),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn add_posts_row_with_generated_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(header("apikey", "test-anon-key"))
        .and(header("authorization", "Bearer service-key"))
        .and(header("prefer", "return=representation"))
        .and(body_partial_json(json!({ "doctor_id": "d1" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            { "id": "generated-1", "doctor_id": "d1" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    let id = client.add("appointments", json!({ "doctor_id": "d1" })).await.unwrap();

    assert_eq!(id, "generated-1");
}

#[tokio::test]
async fn get_returns_none_for_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/user_data"))
        .and(query_param("id", "eq.missing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    let document = client.get("user_data", "missing").await.unwrap();

    assert!(document.is_none());
}

#[tokio::test]
async fn set_puts_full_document_at_id() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", "eq.a1"))
        .and(body_partial_json(json!({ "id": "a1", "approval_status": "approved" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "a1", "approval_status": "approved" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    client
        .set("appointments", "a1", json!({ "approval_status": "approved" }))
        .await
        .unwrap();
}

#[tokio::test]
async fn query_sends_keyset_pagination_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", "eq.p1"))
        .and(query_param("selected_date", "gte.1000"))
        .and(query_param("order", "selected_date.desc,id.desc"))
        .and(query_param("limit", "2"))
        .and(query_param("or", "(selected_date.lt.5000,and(selected_date.eq.5000,id.lt.\"a9\"))"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "a8", "patient_id": "p1", "selected_date": 4000 },
            { "id": "a7", "patient_id": "p1", "selected_date": 3000 }
        ])))
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    let query = Query::collection("appointments")
        .where_eq("patient_id", "p1")
        .where_gte("selected_date", 1000)
        .order_by("selected_date", Direction::Descending)
        .limit(2)
        .start_after(Some(Cursor { document_id: "a9".into(), order_value: json!(5000) }));

    let documents = client.query(&query).await.unwrap();
    let ids: Vec<_> = documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["a8", "a7"]);
}

#[tokio::test]
async fn api_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/symptoms"))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    let err = client
        .query(&Query::collection("symptoms").where_eq("user_id", "u1"))
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("Authentication error"));
}
