//! `$batch` submission: payload shape, version resolution and guarding,
//! and the empty-input short circuit.

use mgraph_core::error::GraphErrorCategory;
use mgraph_core::request::GraphRequest;
use mgraph_core::version::GraphApiVersion;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_batch_payload_shape_and_response_lookup() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/$batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responses": [
                {"id": "1", "status": 200, "body": {"value": [{"id": "u1"}]}},
                {"id": "2", "status": 404, "body": {
                    "error": {"code": "ResourceNotFound", "message": "gone"}
                }}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let batch = factory
        .execute_batch(
            vec![
                GraphRequest::get("/users").with_param("$top", "5"),
                GraphRequest::get("/groups/missing"),
            ],
            None,
        )
        .await
        .expect("batch failed");

    assert!(batch.response("1").unwrap().is_success());
    assert!(!batch.response("2").unwrap().is_success());

    // Inspect the payload that actually went over the wire.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let payload: serde_json::Value = requests[0].body_json().unwrap();
    let entries = payload["requests"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], "1");
    assert_eq!(entries[0]["method"], "GET");
    assert_eq!(entries[0]["url"], "/users?%24top=5");
    assert_eq!(entries[1]["id"], "2");
    assert_eq!(entries[1]["url"], "/groups/missing");
    assert!(entries[0].get("body").is_none());
}

#[tokio::test]
async fn test_empty_batch_short_circuits() {
    let (server, factory) = common::setup_factory().await;

    let batch = factory
        .execute_batch(vec![], None)
        .await
        .expect("empty batch should succeed");
    assert!(batch.responses.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mixed_version_batch_is_rejected() {
    let (server, factory) = common::setup_factory().await;

    // managedDevices resolves to beta via the default overrides; /users
    // stays on v1.0, so the batch cannot be routed to one endpoint.
    let error = factory
        .execute_batch(
            vec![
                GraphRequest::get("/deviceManagement/managedDevices"),
                GraphRequest::get("/users"),
            ],
            None,
        )
        .await
        .expect_err("mixed versions must be rejected");
    assert_eq!(error.category, GraphErrorCategory::Validation);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_explicit_version_routes_batch_endpoint() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("POST"))
        .and(path("/beta/$batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responses": [{"id": "1", "status": 200}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Explicit version overrides per-request resolution entirely.
    let batch = factory
        .execute_batch(
            vec![GraphRequest::get("/users")],
            Some(GraphApiVersion::Beta),
        )
        .await
        .expect("batch failed");
    assert_eq!(batch.responses.len(), 1);
}

#[tokio::test]
async fn test_homogeneous_beta_batch_resolves_automatically() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("POST"))
        .and(path("/beta/$batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responses": [
                {"id": "1", "status": 200},
                {"id": "2", "status": 200}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let batch = factory
        .execute_batch(
            vec![
                GraphRequest::get("/deviceManagement/managedDevices"),
                GraphRequest::get("/deviceManagement/auditEvents"),
            ],
            None,
        )
        .await
        .expect("batch failed");
    assert_eq!(batch.responses.len(), 2);
}
