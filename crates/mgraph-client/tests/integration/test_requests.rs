//! End-to-end request execution: URL construction, auth header, query
//! params, API version routing, byte downloads, and error classification.

use mgraph_core::error::GraphErrorCategory;
use mgraph_core::intune::{device_action_request, mobile_app_icon_request, DeviceAction, IconSize};
use mgraph_core::request::GraphRequest;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_get_json_sends_bearer_token() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(header(
            "Authorization",
            format!("Bearer {}", common::TEST_TOKEN).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "user-1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let body = factory
        .request_json(GraphRequest::get("/users"))
        .await
        .expect("request failed");
    assert_eq!(body["value"][0]["id"], "user-1");
}

#[tokio::test]
async fn test_query_params_are_sent() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$filter", "displayName eq 'Ada'"))
        .and(query_param("$select", "id,displayName"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    factory
        .request_json(
            GraphRequest::get("/users")
                .with_param("$filter", "displayName eq 'Ada'")
                .with_param("$select", "id,displayName"),
        )
        .await
        .expect("request failed");
}

#[tokio::test]
async fn test_intune_paths_route_to_beta_by_default() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("POST"))
        .and(path(
            "/beta/deviceManagement/managedDevices/device-1/syncDevice",
        ))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = factory
        .request(device_action_request("device-1", DeviceAction::Sync, None))
        .await
        .expect("device action failed");
    assert_eq!(response.status().as_u16(), 204);
}

#[tokio::test]
async fn test_request_bytes_returns_raw_body() {
    let (server, factory) = common::setup_factory().await;

    let png = [0x89u8, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    Mock::given(method("GET"))
        .and(path(
            "/beta/deviceAppManagement/mobileApps/app-1/largeIcon/$value",
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png.to_vec())
                .append_header("Content-Type", "image/png"),
        )
        .mount(&server)
        .await;

    let bytes = factory
        .request_bytes(mobile_app_icon_request("app-1", IconSize::Large))
        .await
        .expect("icon download failed");
    assert_eq!(bytes, png);
}

#[tokio::test]
async fn test_403_classified_as_permission_with_guidance() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/deviceAppManagement/mobileApps"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": "Forbidden",
                "message": "Application is not authorized to perform this operation"
            }
        })))
        .mount(&server)
        .await;

    let error = factory
        .request_json(GraphRequest::get("/deviceAppManagement/mobileApps"))
        .await
        .expect_err("expected a permission error");

    assert_eq!(error.category, GraphErrorCategory::Permission);
    assert_eq!(error.status_code, Some(403));
    assert_eq!(error.code.as_deref(), Some("Forbidden"));
    assert!(!error.is_retriable());
    assert!(error.required_permissions().is_some_and(|p| !p.is_empty()));
    assert!(error.recovery_suggestion().is_some());

    let cli = error.cli_example.as_deref().expect("cli example missing");
    assert!(cli.starts_with("az rest --method GET"));
    assert!(!cli.contains(common::TEST_TOKEN));
}

#[tokio::test]
async fn test_404_classified_as_validation() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "ResourceNotFound", "message": "Resource not found"}
        })))
        .mount(&server)
        .await;

    let error = factory
        .request_json(GraphRequest::get("/users/missing"))
        .await
        .expect_err("expected a validation error");
    assert_eq!(error.category, GraphErrorCategory::Validation);
    assert_eq!(error.code.as_deref(), Some("ResourceNotFound"));
    assert!(!error.is_retriable());
}

#[tokio::test]
async fn test_401_classified_as_authentication() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "InvalidAuthenticationToken", "message": "Token expired"}
        })))
        .mount(&server)
        .await;

    let error = factory
        .request_json(GraphRequest::get("/me"))
        .await
        .expect_err("expected an authentication error");
    assert_eq!(error.category, GraphErrorCategory::Authentication);
    assert!(error.recovery_suggestion().is_some());
}

#[tokio::test]
async fn test_non_json_error_body_is_preserved() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: malformed query"))
        .mount(&server)
        .await;

    let error = factory
        .request_json(GraphRequest::get("/users"))
        .await
        .expect_err("expected a validation error");
    assert_eq!(error.category, GraphErrorCategory::Validation);
    assert!(error.message.contains("Bad Request: malformed query"));
}
