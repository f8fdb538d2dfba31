//! Graph API version resolution
//!
//! Microsoft Graph exposes two long-lived versions, `v1.0` and `beta`, and
//! several Intune endpoints are beta-only. This module normalises caller
//! input (aliases, embedded version segments, absolute Graph URLs) into a
//! canonical [`GraphApiVersion`] plus a version-free relative path, and
//! implements boundary-aware prefix matching for the override table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const GRAPH_HOST: &str = "graph.microsoft.com";

/// Supported Microsoft Graph API versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphApiVersion {
    #[default]
    #[serde(rename = "v1.0", alias = "v1", alias = "1.0", alias = "ga")]
    V1,
    #[serde(rename = "beta")]
    Beta,
}

impl GraphApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1.0",
            Self::Beta => "beta",
        }
    }
}

impl std::fmt::Display for GraphApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GraphApiVersion {
    type Err = InvalidApiVersion;

    /// Accepts the aliases `v1`, `v1.0`, `1.0`, and `ga` for V1, plus `beta`,
    /// case-insensitively and with surrounding slashes or whitespace.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalised = value.trim().trim_matches('/').to_ascii_lowercase();
        match normalised.as_str() {
            "v1" | "v1.0" | "1.0" | "ga" => Ok(Self::V1),
            "beta" => Ok(Self::Beta),
            _ => Err(InvalidApiVersion(value.to_string())),
        }
    }
}

/// Returned when a string is not a recognised Graph API version.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised Graph API version: {0:?}")]
pub struct InvalidApiVersion(pub String);

/// Intune endpoints that only exist on the beta surface.
pub fn default_version_overrides() -> HashMap<String, GraphApiVersion> {
    [
        "/deviceManagement/configurationPolicies",
        "/deviceManagement/assignmentFilters",
        "/deviceManagement/auditEvents",
        "/deviceManagement/managedDevices",
    ]
    .into_iter()
    .map(|prefix| (prefix.to_string(), GraphApiVersion::Beta))
    .collect()
}

/// Normalises a request path into a leading-slash, version-free relative path
/// plus any version that was embedded in the path itself.
///
/// Handles absolute `graph.microsoft.com` URLs, embedded `/v1.0/...` or
/// `/beta/...` segments, and trailing slashes (root `/` is preserved).
pub fn prepare_relative_path(path: &str) -> (String, Option<GraphApiVersion>) {
    let mut trimmed = path.trim().to_string();
    for scheme in ["https://", "http://"] {
        let prefix = format!("{scheme}{GRAPH_HOST}");
        if let Some(rest) = trimmed.strip_prefix(&prefix) {
            trimmed = rest.to_string();
            break;
        }
    }
    if !trimmed.starts_with('/') {
        trimmed = format!("/{trimmed}");
    }

    let mut version = None;
    for (prefix, mapped) in [
        ("/beta", GraphApiVersion::Beta),
        ("/v1.0", GraphApiVersion::V1),
        ("/v1", GraphApiVersion::V1),
        ("/1.0", GraphApiVersion::V1),
    ] {
        if trimmed == prefix {
            version = Some(mapped);
            trimmed = "/".to_string();
            break;
        }
        let candidate = format!("{prefix}/");
        if trimmed.starts_with(&candidate) {
            version = Some(mapped);
            trimmed = trimmed[prefix.len()..].to_string();
            if !trimmed.starts_with('/') {
                trimmed = format!("/{trimmed}");
            }
            break;
        }
    }

    if trimmed != "/" && trimmed.ends_with('/') {
        trimmed = trimmed.trim_end_matches('/').to_string();
    }
    if trimmed.is_empty() {
        trimmed = "/".to_string();
    }
    (trimmed, version)
}

/// Normalises an override key so loose user input (with or without host or
/// version prefix) maps onto the canonical relative path.
pub fn normalise_override_key(path: &str) -> String {
    let (relative, _) = prepare_relative_path(path);
    relative
}

/// Whether an override prefix applies to a path, respecting path-segment
/// boundaries: `/a/b` matches `/a/b/c` but not `/a/bc`.
pub fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() || prefix == "/" {
        return true;
    }
    if path == prefix {
        return true;
    }
    let Some(rest) = path.strip_prefix(prefix) else {
        return false;
    };
    rest.is_empty() || rest.starts_with('/')
}
