//! Error taxonomy for Microsoft Graph failures
//!
//! Every failure surfaced by the client is a [`GraphError`] carrying one of
//! seven stable [`GraphErrorCategory`] values, so retry logic and UI recovery
//! can dispatch on category instead of raw status codes. The category also
//! drives read-only recovery metadata (suggestion text, required permissions,
//! documentation links) consumed by callers when rendering guidance.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Graph permissions the application requests; surfaced on PERMISSION errors
/// so callers can tell an administrator exactly what to grant.
pub const INTUNE_REQUIRED_PERMISSIONS: [&str; 3] = [
    "DeviceManagementApps.ReadWrite.All",
    "DeviceManagementManagedDevices.ReadWrite.All",
    "Group.Read.All",
];

/// Stable classification of Graph API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphErrorCategory {
    /// Caller lacks an API permission (HTTP 403)
    Permission,
    /// The operation conflicts with existing data (HTTP 409)
    Conflict,
    /// Malformed request or missing resource (HTTP 400/404)
    Validation,
    /// Server-side throttling (HTTP 429)
    RateLimit,
    /// Transport-level failure (timeout, connection reset, DNS)
    Network,
    /// Invalid or expired credentials (HTTP 401)
    Authentication,
    /// Everything else, including 5xx server errors
    Unknown,
}

impl GraphErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for GraphErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified Microsoft Graph failure.
///
/// Constructed either from an HTTP response via [`GraphError::from_response`]
/// or directly for transport/token failures. The optional request context
/// fields (`request_method`, `request_url`, `cli_example`) are filled in by
/// the client factory so errors can be reproduced outside the application.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GraphError {
    pub message: String,
    pub category: GraphErrorCategory,
    pub status_code: Option<u16>,
    /// Machine-readable `error.code` from the Graph response body
    pub code: Option<String>,
    /// Raw `Retry-After` header value from a 429 response
    pub retry_after: Option<String>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub request_method: Option<String>,
    pub request_url: Option<String>,
    /// `az rest` command line reproducing the failed request (token stripped)
    pub cli_example: Option<String>,
}

impl GraphError {
    pub fn new(message: impl Into<String>, category: GraphErrorCategory) -> Self {
        Self {
            message: message.into(),
            category,
            status_code: None,
            code: None,
            retry_after: None,
            source: None,
            request_method: None,
            request_url: None,
            cli_example: None,
        }
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn rate_limited(retry_after: Option<String>) -> Self {
        let mut error = Self::new("Rate limited", GraphErrorCategory::RateLimit);
        error.status_code = Some(429);
        error.retry_after = retry_after;
        error
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(message, GraphErrorCategory::Authentication)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(message, GraphErrorCategory::Permission)
    }

    pub fn network(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::new(message, GraphErrorCategory::Network).with_source(source)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(message, GraphErrorCategory::Validation)
    }

    /// Classifies an HTTP error response into a taxonomy error.
    ///
    /// The body is parsed as JSON when possible and `error.code` /
    /// `error.message` extracted; otherwise the raw text (or a generic
    /// fallback) becomes the message.
    pub fn from_response(status: u16, retry_after: Option<String>, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let error_info = parsed.as_ref().and_then(|v| v.get("error"));
        let code = error_info
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str())
            .map(str::to_owned);
        let message = error_info
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_owned)
            .or_else(|| {
                if body.trim().is_empty() {
                    None
                } else {
                    Some(body.to_string())
                }
            })
            .unwrap_or_else(|| format!("Graph request failed with status {status}"));

        let category = match status {
            401 => GraphErrorCategory::Authentication,
            403 => GraphErrorCategory::Permission,
            429 => GraphErrorCategory::RateLimit,
            409 => GraphErrorCategory::Conflict,
            400 | 404 => GraphErrorCategory::Validation,
            _ => GraphErrorCategory::Unknown,
        };

        let mut error = Self::new(message, category);
        error.status_code = Some(status);
        error.code = code;
        if status == 429 {
            error.retry_after = retry_after;
        }
        error
    }

    /// Single source of truth for the executor's retry decision.
    pub fn is_retriable(&self) -> bool {
        if matches!(
            self.category,
            GraphErrorCategory::RateLimit | GraphErrorCategory::Network
        ) {
            return true;
        }
        matches!(self.status_code, Some(status) if (500..=599).contains(&status))
    }

    /// Human-readable recovery guidance for the UI layer.
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self.category {
            GraphErrorCategory::Authentication => Some(
                "Sign out and sign back in with an account that has access.".to_string(),
            ),
            GraphErrorCategory::Permission => Some(
                "Request the required Microsoft Graph permissions from your administrator."
                    .to_string(),
            ),
            GraphErrorCategory::RateLimit => Some(match &self.retry_after {
                Some(retry_after) => format!(
                    "Microsoft Graph throttled the request. The app will retry after {retry_after} seconds."
                ),
                None => "Microsoft Graph throttled the request. The app will retry using exponential backoff."
                    .to_string(),
            }),
            GraphErrorCategory::Network => {
                Some("Check your internet connection and try again.".to_string())
            }
            GraphErrorCategory::Conflict => Some(
                "The operation conflicts with existing data. Refresh and verify the latest state."
                    .to_string(),
            ),
            GraphErrorCategory::Validation => {
                Some("The request payload is invalid. Review fields and try again.".to_string())
            }
            GraphErrorCategory::Unknown => None,
        }
    }

    /// Permission scopes the caller must hold; present only for PERMISSION.
    pub fn required_permissions(&self) -> Option<&'static [&'static str]> {
        match self.category {
            GraphErrorCategory::Permission => Some(&INTUNE_REQUIRED_PERMISSIONS),
            _ => None,
        }
    }

    /// Documentation URL relevant to this failure category.
    pub fn help_url(&self) -> Option<&'static str> {
        match self.category {
            GraphErrorCategory::RateLimit => Some("https://learn.microsoft.com/graph/throttling"),
            GraphErrorCategory::Permission => {
                Some("https://learn.microsoft.com/graph/permissions-reference")
            }
            GraphErrorCategory::Authentication => Some(
                "https://learn.microsoft.com/azure/active-directory/develop/troubleshoot-common-errors",
            ),
            GraphErrorCategory::Unknown => None,
            _ => Some("https://learn.microsoft.com/graph/errors"),
        }
    }
}
