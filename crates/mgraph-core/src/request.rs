//! Request descriptors and the Graph `$batch` contract
//!
//! [`GraphRequest`] is the structured description of one Graph call: method,
//! relative URL, headers, JSON body, query params, and an optional explicit
//! API version. The same descriptor serves single requests (through the
//! client factory) and `$batch` sub-requests (via [`GraphRequest::to_batch_entry`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::version::GraphApiVersion;

/// HTTP verbs accepted by Microsoft Graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GraphMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl GraphMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Mutating verbs count against the Graph write quota.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl std::fmt::Display for GraphMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured representation of a Microsoft Graph request.
#[derive(Debug, Clone)]
pub struct GraphRequest {
    pub method: GraphMethod,
    /// Relative path (`/users/{id}`) or an absolute URL (pagination links)
    pub url: String,
    /// Explicit batch entry id; falls back to the 1-based position
    pub request_id: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Option<Value>,
    pub params: Option<Vec<(String, String)>>,
    pub api_version: Option<GraphApiVersion>,
    pub depends_on: Option<Vec<String>>,
}

impl GraphRequest {
    pub fn new(method: GraphMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            request_id: None,
            headers: None,
            body: None,
            params: None,
            api_version: None,
            depends_on: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(GraphMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(GraphMethod::Post, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(GraphMethod::Patch, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(GraphMethod::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(GraphMethod::Delete, url)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    pub fn with_api_version(mut self, version: GraphApiVersion) -> Self {
        self.api_version = Some(version);
        self
    }

    pub fn with_depends_on(mut self, ids: Vec<String>) -> Self {
        self.depends_on = Some(ids);
        self
    }

    /// Converts this descriptor into a `$batch` entry.
    ///
    /// `fallback_id` is used when no explicit id was set. The body is only
    /// serialized for write verbs that carry one, and the entry URL is
    /// version-prefixed when this request pins an explicit version.
    pub fn to_batch_entry(&self, fallback_id: &str) -> BatchEntry {
        let id = self
            .request_id
            .clone()
            .unwrap_or_else(|| fallback_id.to_string());
        let url = normalise_batch_url(
            &self.url,
            self.api_version,
            self.params.as_deref().unwrap_or(&[]),
        );
        let body = match self.method {
            GraphMethod::Post | GraphMethod::Patch | GraphMethod::Put => self.body.clone(),
            _ => None,
        };
        BatchEntry {
            id,
            method: self.method,
            url,
            headers: self.headers.clone(),
            body,
            depends_on: self.depends_on.clone(),
        }
    }
}

/// One sub-request inside a `$batch` payload, per the Graph batch contract.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub id: String,
    pub method: GraphMethod,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(rename = "dependsOn", skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
}

/// Builds the `requests` array of a `$batch` payload, auto-numbering entries
/// from 1 where no explicit id is set.
pub fn build_batch_entries(requests: &[GraphRequest]) -> Vec<BatchEntry> {
    requests
        .iter()
        .enumerate()
        .map(|(index, request)| request.to_batch_entry(&(index + 1).to_string()))
        .collect()
}

fn normalise_batch_url(
    url: &str,
    api_version: Option<GraphApiVersion>,
    params: &[(String, String)],
) -> String {
    let mut url = if url.starts_with('/') {
        url.to_string()
    } else {
        format!("/{url}")
    };
    if let Some(version) = api_version {
        let prefix = format!("/{}", version.as_str());
        if !url.starts_with(&prefix) {
            url = format!("{prefix}{url}");
        }
    }
    if !params.is_empty() {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        let separator = if url.contains('?') { '&' } else { '?' };
        url = format!("{url}{separator}{encoded}");
    }
    url
}

/// Response envelope returned by the `$batch` endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub responses: Vec<BatchEntryResponse>,
}

impl BatchResponse {
    /// Looks up a sub-response by entry id.
    pub fn response(&self, id: &str) -> Option<&BatchEntryResponse> {
        self.responses.iter().find(|entry| entry.id == id)
    }
}

/// Outcome of one sub-request inside a `$batch` response.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchEntryResponse {
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl BatchEntryResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
