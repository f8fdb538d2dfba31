//! Typed request constructors for common Intune endpoints
//!
//! These wrap the raw paths and beta-version quirks of the Intune surface so
//! services build [`GraphRequest`] descriptors without string templating.

use serde_json::{json, Value};

use crate::request::GraphRequest;
use crate::version::GraphApiVersion;

/// Remote actions supported on managed devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Sync,
    Retire,
    Wipe,
    RebootNow,
    ShutDown,
}

impl DeviceAction {
    /// Graph action segment name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "syncDevice",
            Self::Retire => "retire",
            Self::Wipe => "wipe",
            Self::RebootNow => "rebootNow",
            Self::ShutDown => "shutDown",
        }
    }
}

/// Icon sizes published for managed mobile apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconSize {
    Large,
    Small,
}

/// Configuration endpoints that accept an `assign` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationEndpoint {
    DeviceConfigurations,
    /// Settings Catalog policies; beta-only.
    ConfigurationPolicies,
}

/// POST request targeting a managed device operation.
pub fn device_action_request(
    device_id: &str,
    action: DeviceAction,
    body: Option<Value>,
) -> GraphRequest {
    GraphRequest::post(format!(
        "/deviceManagement/managedDevices/{device_id}/{}",
        action.as_str()
    ))
    .with_body(body.unwrap_or_else(|| json!({})))
}

/// Mobile app `assign` action with the full replacement assignment set.
pub fn mobile_app_assign_request(app_id: &str, assignments: Vec<Value>) -> GraphRequest {
    GraphRequest::post(format!("/deviceAppManagement/mobileApps/{app_id}/assign"))
        .with_body(json!({ "mobileAppAssignments": assignments }))
        .with_api_version(GraphApiVersion::Beta)
}

/// Fetch the assignments collection for a mobile app.
pub fn mobile_app_assignments_request(app_id: &str) -> GraphRequest {
    GraphRequest::get(format!(
        "/deviceAppManagement/mobileApps/{app_id}/assignments"
    ))
}

pub fn mobile_app_assignment_update_request(
    app_id: &str,
    assignment_id: &str,
    payload: Value,
) -> GraphRequest {
    GraphRequest::patch(format!(
        "/deviceAppManagement/mobileApps/{app_id}/assignments/{assignment_id}"
    ))
    .with_body(payload)
}

pub fn mobile_app_assignment_delete_request(app_id: &str, assignment_id: &str) -> GraphRequest {
    GraphRequest::delete(format!(
        "/deviceAppManagement/mobileApps/{app_id}/assignments/{assignment_id}"
    ))
}

pub fn mobile_app_install_summary_request(app_id: &str) -> GraphRequest {
    GraphRequest::get(format!(
        "/deviceAppManagement/mobileApps/{app_id}/installSummary"
    ))
    .with_api_version(GraphApiVersion::Beta)
}

/// Binary icon download for a managed mobile app.
pub fn mobile_app_icon_request(app_id: &str, size: IconSize) -> GraphRequest {
    let suffix = match size {
        IconSize::Large => "largeIcon",
        IconSize::Small => "smallIcon",
    };
    GraphRequest::get(format!(
        "/deviceAppManagement/mobileApps/{app_id}/{suffix}/$value"
    ))
    .with_header("Accept", "image/png")
    .with_api_version(GraphApiVersion::Beta)
}

/// Assign action for configuration profiles and Settings Catalog policies.
pub fn configuration_assign_request(
    configuration_id: &str,
    body: Value,
    endpoint: ConfigurationEndpoint,
) -> GraphRequest {
    let segment = match endpoint {
        ConfigurationEndpoint::DeviceConfigurations => "deviceConfigurations",
        ConfigurationEndpoint::ConfigurationPolicies => "configurationPolicies",
    };
    let request = GraphRequest::post(format!(
        "/deviceManagement/{segment}/{configuration_id}/assign"
    ))
    .with_body(body);
    match endpoint {
        ConfigurationEndpoint::ConfigurationPolicies => {
            request.with_api_version(GraphApiVersion::Beta)
        }
        ConfigurationEndpoint::DeviceConfigurations => request,
    }
}

/// Audit log query; requires the eventual-consistency header.
pub fn audit_events_request() -> GraphRequest {
    GraphRequest::get("/deviceManagement/auditEvents")
        .with_header("ConsistencyLevel", "eventual")
        .with_api_version(GraphApiVersion::Beta)
}

pub fn assignment_filters_request() -> GraphRequest {
    GraphRequest::get("/deviceManagement/assignmentFilters")
        .with_api_version(GraphApiVersion::Beta)
}
