//! Telemetry emission: one event per logical request, panic isolation,
//! and the enable_telemetry kill switch.

use std::sync::Arc;

use mgraph_core::error::GraphErrorCategory;
use mgraph_core::request::GraphRequest;
use mgraph_core::telemetry::{TelemetryEvent, TelemetrySink};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, RecordingSink};

#[tokio::test]
async fn test_success_emits_one_event() {
    let (server, factory) = common::setup_factory().await;
    let sink = Arc::new(RecordingSink::default());
    let factory = factory.with_telemetry(sink.clone());

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&server)
        .await;

    factory
        .request_json(GraphRequest::get("/users"))
        .await
        .expect("request failed");

    let events = sink.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert!(event.success);
    assert_eq!(event.method, "GET");
    assert_eq!(event.status_code, Some(200));
    assert_eq!(event.retries, 0);
    assert!(event.category.is_none());
    assert!(event.duration_ms >= 0.0);
}

#[tokio::test]
async fn test_failure_event_carries_category() {
    let (server, factory) = common::setup_factory().await;
    let sink = Arc::new(RecordingSink::default());
    let factory = factory.with_telemetry(sink.clone());

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": "Forbidden", "message": "denied"}
        })))
        .mount(&server)
        .await;

    factory
        .request_json(GraphRequest::get("/users"))
        .await
        .expect_err("expected a permission error");

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
    assert_eq!(events[0].status_code, Some(403));
    assert_eq!(events[0].category, Some(GraphErrorCategory::Permission));
}

#[tokio::test]
async fn test_retried_request_emits_single_event_with_retry_count() {
    let (server, factory) = common::setup_factory().await;
    let sink = Arc::new(RecordingSink::default());
    let factory = factory.with_telemetry(sink.clone());

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&server)
        .await;

    factory
        .request_json(GraphRequest::get("/users"))
        .await
        .expect("request failed");

    let events = sink.events();
    assert_eq!(events.len(), 1, "one event per logical request");
    assert!(events[0].success);
    assert_eq!(events[0].retries, 1);
}

#[tokio::test]
async fn test_panicking_sink_does_not_break_requests() {
    struct PanickingSink;
    impl TelemetrySink for PanickingSink {
        fn record(&self, _event: &TelemetryEvent) {
            panic!("sink exploded");
        }
    }

    let (server, factory) = common::setup_factory().await;
    let factory = factory.with_telemetry(Arc::new(PanickingSink));

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&server)
        .await;

    factory
        .request_json(GraphRequest::get("/users"))
        .await
        .expect("request must survive a panicking sink");
}

#[tokio::test]
async fn test_disabled_telemetry_records_nothing() {
    let (server, factory) =
        common::setup_factory_with(|config| config.enable_telemetry = false).await;
    let sink = Arc::new(RecordingSink::default());
    let factory = factory.with_telemetry(sink.clone());

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&server)
        .await;

    factory
        .request_json(GraphRequest::get("/users"))
        .await
        .expect("request failed");

    assert!(sink.events().is_empty());
}
