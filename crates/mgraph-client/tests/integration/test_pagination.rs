//! Collection pagination: `$top` injection, `@odata.nextLink` following,
//! and non-collection payload passthrough.

use futures_util::TryStreamExt;
use mgraph_core::request::GraphRequest;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_collection_follows_next_link() {
    let (server, factory) = common::setup_factory().await;

    let next_link = format!("{}/v1.0/devices?$skiptoken=page2", server.uri());
    // Page 1 carries the configured $top and a nextLink.
    Mock::given(method("GET"))
        .and(path("/v1.0/devices"))
        .and(query_param("$top", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "d1"}, {"id": "d2"}],
            "@odata.nextLink": next_link
        })))
        .expect(1)
        .mount(&server)
        .await;
    // Page 2: followed via the absolute link, so no $top is re-injected.
    Mock::given(method("GET"))
        .and(path("/v1.0/devices"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "d3"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = factory
        .collect_collection(GraphRequest::get("/devices"))
        .await
        .expect("pagination failed");
    let ids: Vec<&str> = items.iter().filter_map(|v| v["id"].as_str()).collect();
    assert_eq!(ids, ["d1", "d2", "d3"]);
}

#[tokio::test]
async fn test_caller_top_param_is_not_overridden() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/devices"))
        .and(query_param("$top", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "d1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = factory
        .collect_collection(GraphRequest::get("/devices").with_param("$top", "7"))
        .await
        .expect("pagination failed");
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn test_non_collection_payload_yields_once() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/devices/d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "d1",
            "deviceName": "laptop-01"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = factory
        .collect_collection(GraphRequest::get("/devices/d1"))
        .await
        .expect("request failed");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["deviceName"], "laptop-01");
}

#[tokio::test]
async fn test_empty_collection_yields_nothing() {
    let (server, factory) = common::setup_factory().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&server)
        .await;

    let items = factory
        .collect_collection(GraphRequest::get("/devices"))
        .await
        .expect("request failed");
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_error_mid_pagination_propagates_after_buffered_items() {
    let (server, factory) = common::setup_factory().await;

    let next_link = format!("{}/v1.0/devices?$skiptoken=page2", server.uri());
    Mock::given(method("GET"))
        .and(path("/v1.0/devices"))
        .and(query_param("$top", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "d1"}],
            "@odata.nextLink": next_link
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/devices"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": "Forbidden", "message": "Access denied"}
        })))
        .mount(&server)
        .await;

    let stream = factory.iter_collection(GraphRequest::get("/devices"));
    futures_util::pin_mut!(stream);

    let first = stream.try_next().await.expect("first item should arrive");
    assert_eq!(first.unwrap()["id"], "d1");

    let error = stream
        .try_next()
        .await
        .expect_err("second page should fail");
    assert_eq!(error.code.as_deref(), Some("Forbidden"));
    assert!(error.cli_example.is_some());
}
