//! Client configuration
//!
//! Typed configuration for the Graph client factory, with serde support so
//! host applications can embed it in their own settings structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::version::{default_version_overrides, GraphApiVersion};

/// Settings consumed by the client factory when building an executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphClientConfig {
    /// OAuth scopes requested from the token provider.
    pub scopes: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Overridable for tests pointing at a mock server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Default API version when no override or explicit version applies.
    #[serde(default)]
    pub api_version: GraphApiVersion,
    /// Path prefix -> version table; defaults to the beta-only Intune paths.
    #[serde(default = "default_version_overrides")]
    pub version_overrides: HashMap<String, GraphApiVersion>,
    /// Injected as `$top` on collection queries when the caller didn't set one.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// When false, no telemetry sink is invoked.
    #[serde(default = "default_enable_telemetry")]
    pub enable_telemetry: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl GraphClientConfig {
    /// Configuration with defaults for everything except the mandatory scopes.
    pub fn new(scopes: Vec<String>) -> Self {
        Self {
            scopes,
            user_agent: default_user_agent(),
            base_url: default_base_url(),
            api_version: GraphApiVersion::default(),
            version_overrides: default_version_overrides(),
            page_size: default_page_size(),
            enable_telemetry: default_enable_telemetry(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_user_agent() -> String {
    "mgraph-rs".to_string()
}

fn default_base_url() -> String {
    "https://graph.microsoft.com".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_enable_telemetry() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}
