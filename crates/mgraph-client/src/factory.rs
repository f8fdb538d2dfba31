//! Client factory: the public entry point of the access layer
//!
//! [`GraphClientFactory`] binds a token provider to a configured
//! [`RateLimitedClient`] and adds the ergonomics services actually want:
//! JSON/byte helpers, lazy `@odata.nextLink` pagination, `$batch` submission
//! with version guarding, runtime API-version overrides, and error
//! enrichment with an `az rest` reproduction hint.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::{Stream, TryStreamExt};
use mgraph_core::auth::TokenProvider;
use mgraph_core::config::GraphClientConfig;
use mgraph_core::error::{GraphError, GraphErrorCategory};
use mgraph_core::request::{build_batch_entries, BatchResponse, GraphRequest};
use mgraph_core::telemetry::TelemetrySink;
use mgraph_core::version::{
    normalise_override_key, prefix_matches, prepare_relative_path, GraphApiVersion,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::{RateLimitedClient, RequestSpec};
use crate::rate_limit::RateLimiter;

/// Longest body rendered into the `az rest` reproduction hint.
const CLI_BODY_LIMIT: usize = 800;

/// Runtime-adjustable version resolution table.
#[derive(Debug)]
struct VersionState {
    default: GraphApiVersion,
    overrides: std::collections::HashMap<String, GraphApiVersion>,
}

/// Factory producing resilient Graph calls bound to one token provider.
///
/// The rate limiter is owned here (or injected via
/// [`GraphClientFactory::with_rate_limiter`]) rather than being process-wide
/// state, so tests and multi-tenant hosts get isolated instances.
pub struct GraphClientFactory {
    client: RateLimitedClient,
    config: GraphClientConfig,
    versions: Mutex<VersionState>,
}

impl std::fmt::Debug for GraphClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClientFactory")
            .field("base_url", &self.config.base_url)
            .field("scopes", &self.config.scopes)
            .finish()
    }
}

impl GraphClientFactory {
    /// Builds a factory and its HTTP client from the given configuration.
    pub fn new(
        token_provider: Arc<dyn TokenProvider>,
        config: GraphClientConfig,
    ) -> Result<Self, GraphError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|source| {
                GraphError::new("Failed to build HTTP client", GraphErrorCategory::Unknown)
                    .with_source(source)
            })?;
        let client = RateLimitedClient::new(http, token_provider, config.scopes.clone());

        let mut overrides = std::collections::HashMap::new();
        for (prefix, version) in &config.version_overrides {
            let key = normalise_override_key(prefix);
            if key == "/" && prefix.trim().is_empty() {
                return Err(GraphError::validation(
                    "Version override prefix cannot be empty",
                ));
            }
            overrides.insert(key, *version);
        }

        Ok(Self {
            client,
            versions: Mutex::new(VersionState {
                default: config.api_version,
                overrides,
            }),
            config,
        })
    }

    /// Shares a rate limiter with other factories (or a test harness).
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.client = self.client.with_rate_limiter(limiter);
        self
    }

    /// Attaches a telemetry sink, honoring `enable_telemetry`.
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        if self.config.enable_telemetry {
            self.client = self.client.with_telemetry(sink);
        }
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.client.rate_limiter()
    }

    // ------------------------------------------------------------------
    // API version management
    // ------------------------------------------------------------------

    pub fn default_api_version(&self) -> GraphApiVersion {
        self.versions.lock().unwrap().default
    }

    /// Updates the default version used when no override applies.
    pub fn set_default_api_version(&self, version: GraphApiVersion) {
        self.versions.lock().unwrap().default = version;
    }

    /// Snapshot of the registered path-based overrides.
    pub fn version_overrides(&self) -> std::collections::HashMap<String, GraphApiVersion> {
        self.versions.lock().unwrap().overrides.clone()
    }

    /// Forces a specific API version for requests matching a path prefix.
    pub fn set_version_override(
        &self,
        prefix: &str,
        version: GraphApiVersion,
    ) -> Result<(), GraphError> {
        if prefix.trim().is_empty() {
            return Err(GraphError::validation(
                "Version override prefix cannot be empty",
            ));
        }
        let key = normalise_override_key(prefix);
        self.versions.lock().unwrap().overrides.insert(key, version);
        Ok(())
    }

    pub fn remove_version_override(&self, prefix: &str) {
        let key = normalise_override_key(prefix);
        self.versions.lock().unwrap().overrides.remove(&key);
    }

    pub fn clear_version_overrides(&self) {
        self.versions.lock().unwrap().overrides.clear();
    }

    /// Resolves the API version that will be used for a given request path.
    ///
    /// Precedence: explicit per-request version, then a version embedded in
    /// the path, then the longest matching override prefix, then the default.
    pub fn resolve_api_version(
        &self,
        path: &str,
        explicit: Option<GraphApiVersion>,
    ) -> GraphApiVersion {
        let (relative, embedded) = prepare_relative_path(path);
        self.resolve_relative(&relative, explicit.or(embedded))
    }

    fn resolve_relative(
        &self,
        relative_path: &str,
        explicit: Option<GraphApiVersion>,
    ) -> GraphApiVersion {
        if let Some(version) = explicit {
            return version;
        }
        let versions = self.versions.lock().unwrap();
        let mut best: Option<(&String, GraphApiVersion)> = None;
        for (prefix, version) in &versions.overrides {
            if prefix_matches(prefix, relative_path)
                && best.map_or(true, |(current, _)| prefix.len() > current.len())
            {
                best = Some((prefix, *version));
            }
        }
        best.map(|(_, version)| version).unwrap_or(versions.default)
    }

    /// Resolves a path into an absolute URL; absolute URLs pass through so
    /// pagination links can be followed verbatim.
    pub fn absolute_url(&self, path: &str, explicit: Option<GraphApiVersion>) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let (relative, embedded) = prepare_relative_path(path);
        let version = self.resolve_relative(&relative, explicit.or(embedded));
        format!(
            "{}/{}{}",
            self.config.base_url.trim_end_matches('/'),
            version.as_str(),
            relative
        )
    }

    // ------------------------------------------------------------------
    // Request helpers
    // ------------------------------------------------------------------

    /// Executes one request, returning the raw response.
    pub async fn request(&self, request: GraphRequest) -> Result<reqwest::Response, GraphError> {
        let spec = self.prepare(request);
        match self.client.send(&spec).await {
            Ok(response) => Ok(response),
            Err(mut error) => {
                self.enrich_error(&mut error, &spec);
                Err(error)
            }
        }
    }

    /// Executes a request and parses the body as JSON.
    pub async fn request_json(&self, request: GraphRequest) -> Result<Value, GraphError> {
        let response = self.request(request).await?;
        response.json().await.map_err(|source| {
            GraphError::new(
                "Failed to decode Graph response as JSON",
                GraphErrorCategory::Unknown,
            )
            .with_source(source)
        })
    }

    /// Executes a request and returns the raw body bytes (icons, `$value`).
    pub async fn request_bytes(&self, request: GraphRequest) -> Result<Vec<u8>, GraphError> {
        let response = self.request(request).await?;
        let bytes = response.bytes().await.map_err(|source| {
            GraphError::network("Failed to read Graph response body", source)
        })?;
        Ok(bytes.to_vec())
    }

    /// Lazily yields the items of a Graph collection, following
    /// `@odata.nextLink` pagination.
    ///
    /// The configured page size is injected as `$top` unless the caller
    /// already set one. Non-collection payloads are yielded once verbatim.
    pub fn iter_collection(
        &self,
        request: GraphRequest,
    ) -> impl Stream<Item = Result<Value, GraphError>> + '_ {
        enum PageTarget {
            First(Box<GraphRequest>),
            Link(String),
        }
        struct PageState {
            next: Option<PageTarget>,
            buffered: VecDeque<Value>,
            method: mgraph_core::request::GraphMethod,
            headers: Option<std::collections::BTreeMap<String, String>>,
        }

        let mut first = request;
        let page_size = self.config.page_size;
        if page_size > 0 {
            let params = first.params.get_or_insert_with(Vec::new);
            if !params.iter().any(|(key, _)| key == "$top") {
                params.push(("$top".to_string(), page_size.to_string()));
            }
        }
        let state = PageState {
            method: first.method,
            headers: first.headers.clone(),
            next: Some(PageTarget::First(Box::new(first))),
            buffered: VecDeque::new(),
        };

        futures_util::stream::try_unfold(state, move |mut state| async move {
            loop {
                if let Some(item) = state.buffered.pop_front() {
                    return Ok(Some((item, state)));
                }
                let call = match state.next.take() {
                    Some(PageTarget::First(request)) => *request,
                    Some(PageTarget::Link(link)) => {
                        let mut follow = GraphRequest::new(state.method, link);
                        follow.headers = state.headers.clone();
                        follow
                    }
                    None => return Ok(None),
                };
                let mut payload = self.request_json(call).await?;
                let next_link = payload
                    .get("@odata.nextLink")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                match payload.get_mut("value") {
                    Some(value) if value.is_array() => {
                        if let Value::Array(items) = value.take() {
                            debug!(items = items.len(), "Fetched collection page");
                            state.buffered.extend(items);
                        }
                        state.next = next_link.map(PageTarget::Link);
                    }
                    _ => {
                        state.next = None;
                        return Ok(Some((payload, state)));
                    }
                }
            }
        })
    }

    /// Eagerly drains [`GraphClientFactory::iter_collection`] into a vec.
    pub async fn collect_collection(
        &self,
        request: GraphRequest,
    ) -> Result<Vec<Value>, GraphError> {
        self.iter_collection(request).try_collect().await
    }

    /// Submits requests through the Graph `$batch` endpoint.
    ///
    /// All entries must resolve to one API version; mixed versions are a
    /// validation error instructing the caller to split the batch. An empty
    /// input short-circuits without any HTTP traffic.
    pub async fn execute_batch(
        &self,
        requests: Vec<GraphRequest>,
        api_version: Option<GraphApiVersion>,
    ) -> Result<BatchResponse, GraphError> {
        if requests.is_empty() {
            return Ok(BatchResponse::default());
        }

        let mut resolved = api_version;
        if api_version.is_none() {
            for request in &requests {
                let hint = self.resolve_api_version(&request.url, request.api_version);
                match resolved {
                    None => resolved = Some(hint),
                    Some(version) if version != hint => {
                        return Err(GraphError::validation(
                            "Batch requests span multiple Graph API versions; split the batch \
                             by version or pass api_version explicitly.",
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        let payload = json!({ "requests": build_batch_entries(&requests) });
        let effective = resolved.unwrap_or_else(|| self.default_api_version());
        let value = self
            .request_json(
                GraphRequest::post("/$batch")
                    .with_header("Content-Type", "application/json")
                    .with_body(payload)
                    .with_api_version(effective),
            )
            .await?;
        serde_json::from_value(value).map_err(|source| {
            GraphError::new(
                "Malformed $batch response from Microsoft Graph",
                GraphErrorCategory::Unknown,
            )
            .with_source(source)
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn prepare(&self, request: GraphRequest) -> RequestSpec {
        let url = self.absolute_url(&request.url, request.api_version);
        RequestSpec {
            method: request.method,
            url,
            headers: request
                .headers
                .map(|headers| headers.into_iter().collect())
                .unwrap_or_default(),
            query: request.params.unwrap_or_default(),
            json_body: request.body,
            body_bytes: None,
        }
    }

    /// Attaches request context and an `az rest` reproduction hint to errors
    /// that don't carry one yet (batch and pagination reuse this path).
    fn enrich_error(&self, error: &mut GraphError, spec: &RequestSpec) {
        if error.request_method.is_some() {
            return;
        }
        let url = url_with_query(spec);
        error.request_method = Some(spec.method.as_str().to_string());
        error.request_url = Some(url.clone());
        if error.cli_example.is_none() {
            error.cli_example = Some(build_cli_example(spec, &url));
        }
    }
}

fn url_with_query(spec: &RequestSpec) -> String {
    if spec.query.is_empty() {
        return spec.url.clone();
    }
    match url::Url::parse(&spec.url) {
        Ok(mut parsed) => {
            {
                let mut pairs = parsed.query_pairs_mut();
                for (key, value) in &spec.query {
                    pairs.append_pair(key, value);
                }
            }
            parsed.to_string()
        }
        Err(_) => spec.url.clone(),
    }
}

/// Renders the failed request as an `az rest` command line with the
/// Authorization header stripped and the body compacted and truncated.
fn build_cli_example(spec: &RequestSpec, url: &str) -> String {
    let mut tokens = vec![
        "az".to_string(),
        "rest".to_string(),
        "--method".to_string(),
        spec.method.as_str().to_string(),
        "--url".to_string(),
        url.to_string(),
    ];
    for (key, value) in &spec.headers {
        if key.eq_ignore_ascii_case("authorization") {
            continue;
        }
        tokens.push("--headers".to_string());
        tokens.push(format!("{key}={value}"));
    }
    if let Some(body) = &spec.json_body {
        let compact = serde_json::to_string(body).unwrap_or_else(|_| body.to_string());
        tokens.push("--body".to_string());
        tokens.push(truncate_cli_value(&compact));
    } else if spec.body_bytes.is_some() {
        tokens.push("--body".to_string());
        tokens.push("<binary content>".to_string());
    }
    tokens
        .iter()
        .map(|token| shell_quote(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_cli_value(value: &str) -> String {
    let compact = value.replace('\n', " ").trim().to_string();
    if compact.len() <= CLI_BODY_LIMIT {
        return compact;
    }
    let mut cut = CLI_BODY_LIMIT - 3;
    while !compact.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &compact[..cut])
}

/// POSIX shell quoting in the manner of Python's `shlex.quote`.
fn shell_quote(value: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c);
    if !value.is_empty() && value.chars().all(safe) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
