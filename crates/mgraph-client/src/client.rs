//! Rate-limited request executor
//!
//! [`RateLimitedClient`] wraps every outbound send with quota admission,
//! retry-on-transient-failure, taxonomy classification, and telemetry,
//! transparently to callers who just want a response:
//!
//! 1. Wait until the rate limiter admits the request (sleeping on the
//!    proactive delay, never busy-spinning).
//! 2. Record the request, fetch a bearer token, and send.
//! 3. Retry transport timeouts and 429s with computed backoff, up to the
//!    configured attempt budget.
//! 4. Classify any remaining failure into a [`GraphError`] and emit one
//!    telemetry event for the whole logical request.

use std::{sync::Arc, time::Duration};

use mgraph_core::auth::TokenProvider;
use mgraph_core::error::{GraphError, GraphErrorCategory};
use mgraph_core::request::GraphMethod;
use mgraph_core::telemetry::{TelemetryEvent, TelemetrySink};
use reqwest::{header::RETRY_AFTER, Client, Method, Response};
use tracing::{debug, info, warn};

use crate::rate_limit::RateLimiter;

/// Floor for the admission-wait sleep so a zero proactive delay cannot
/// busy-spin the loop.
const ADMISSION_RECHECK: Duration = Duration::from_millis(50);

/// One fully-resolved outbound request, rebuilt per attempt.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: GraphMethod,
    /// Absolute URL (version prefix already applied)
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub json_body: Option<serde_json::Value>,
    pub body_bytes: Option<Vec<u8>>,
}

impl RequestSpec {
    pub fn new(method: GraphMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            json_body: None,
            body_bytes: None,
        }
    }
}

fn to_http_method(method: GraphMethod) -> Method {
    match method {
        GraphMethod::Get => Method::GET,
        GraphMethod::Post => Method::POST,
        GraphMethod::Patch => Method::PATCH,
        GraphMethod::Put => Method::PUT,
        GraphMethod::Delete => Method::DELETE,
    }
}

/// HTTP executor enforcing rate limits and the retry/backoff policy.
///
/// Shared-state safety comes from the limiter's internal lock; the executor
/// itself holds no locks across awaits, so any number of sends may be in
/// flight concurrently on one client.
pub struct RateLimitedClient {
    http: Client,
    rate_limiter: Arc<RateLimiter>,
    token_provider: Arc<dyn TokenProvider>,
    scopes: Vec<String>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl std::fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("scopes", &self.scopes)
            .field("rate_limiter", &self.rate_limiter)
            .finish()
    }
}

impl RateLimitedClient {
    pub fn new(http: Client, token_provider: Arc<dyn TokenProvider>, scopes: Vec<String>) -> Self {
        Self {
            http,
            rate_limiter: Arc::new(RateLimiter::with_defaults()),
            token_provider,
            scopes,
            telemetry: None,
        }
    }

    /// Replaces the default rate limiter with a shared instance.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Attaches a telemetry sink invoked once per completed logical request.
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Executes one logical request, retrying transient failures.
    ///
    /// Returns the response for any status below 400; every other outcome is
    /// a classified [`GraphError`].
    pub async fn send(&self, spec: &RequestSpec) -> Result<Response, GraphError> {
        let is_write = spec.method.is_write();
        let start = std::time::Instant::now();
        let mut attempt: u32 = 1;

        loop {
            while !self.rate_limiter.can_make_request(is_write) {
                let delay = self.rate_limiter.calculate_delay(is_write).max(ADMISSION_RECHECK);
                debug!(
                    url = %spec.url,
                    wait_ms = delay.as_millis() as u64,
                    "Window saturated, waiting for admission"
                );
                tokio::time::sleep(delay).await;
            }
            self.rate_limiter.record_request(is_write);

            let token = match self.token_provider.access_token(&self.scopes).await {
                Ok(token) => token,
                Err(source) => {
                    let error = GraphError::authentication(format!(
                        "Failed to acquire access token: {source:#}"
                    ));
                    self.publish_telemetry(spec, start, None, attempt - 1, Some(error.category));
                    return Err(error);
                }
            };

            let response = match self.build_request(spec, &token.token).send().await {
                Ok(response) => response,
                Err(source) if source.is_timeout() => {
                    if self.rate_limiter.should_retry(attempt, &source) {
                        let delay = self.rate_limiter.calculate_retry_delay(attempt, None);
                        info!(
                            url = %spec.url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Timeout, backing off before retry"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    self.publish_telemetry(
                        spec,
                        start,
                        None,
                        attempt - 1,
                        Some(GraphErrorCategory::Network),
                    );
                    return Err(GraphError::network(
                        "Network timeout communicating with Microsoft Graph",
                        source,
                    ));
                }
                Err(source) => {
                    self.publish_telemetry(
                        spec,
                        start,
                        None,
                        attempt - 1,
                        Some(GraphErrorCategory::Network),
                    );
                    return Err(GraphError::network(
                        format!("Network error communicating with Microsoft Graph: {source}"),
                        source,
                    ));
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.rate_limiter.record_rate_limit();
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                if attempt > self.rate_limiter.max_retries() {
                    warn!(url = %spec.url, attempts = attempt, "429 retry budget exhausted");
                    self.publish_telemetry(
                        spec,
                        start,
                        Some(status.as_u16()),
                        attempt - 1,
                        Some(GraphErrorCategory::RateLimit),
                    );
                    return Err(GraphError::rate_limited(retry_after));
                }
                let delay = self
                    .rate_limiter
                    .calculate_retry_delay(attempt, retry_after.as_deref());
                info!(
                    url = %spec.url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Received 429, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if status.as_u16() >= 400 {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let body = response.text().await.unwrap_or_default();
                let error = GraphError::from_response(status.as_u16(), retry_after, &body);
                self.publish_telemetry(
                    spec,
                    start,
                    Some(status.as_u16()),
                    attempt - 1,
                    Some(error.category),
                );
                return Err(error);
            }

            self.rate_limiter.reset_rate_limit_tracking();
            if attempt > 1 {
                info!(url = %spec.url, attempt, "Request succeeded after retry");
            }
            self.publish_telemetry(spec, start, Some(status.as_u16()), attempt - 1, None);
            return Ok(response);
        }
    }

    fn build_request(&self, spec: &RequestSpec, token: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(to_http_method(spec.method), &spec.url)
            .bearer_auth(token);
        for (key, value) in &spec.headers {
            builder = builder.header(key, value);
        }
        if !spec.query.is_empty() {
            builder = builder.query(&spec.query);
        }
        if let Some(body) = &spec.json_body {
            builder = builder.json(body);
        }
        if let Some(bytes) = &spec.body_bytes {
            builder = builder.body(bytes.clone());
        }
        builder
    }

    /// Emits one event per terminal outcome. Sink panics are caught and
    /// logged so observability can never break the request path.
    fn publish_telemetry(
        &self,
        spec: &RequestSpec,
        start: std::time::Instant,
        status_code: Option<u16>,
        retries: u32,
        category: Option<GraphErrorCategory>,
    ) {
        let Some(sink) = &self.telemetry else {
            return;
        };
        let event = TelemetryEvent {
            method: spec.method.as_str().to_string(),
            url: spec.url.clone(),
            status_code,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            retries,
            category,
            success: category.is_none(),
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sink.record(&event);
        }));
        if result.is_err() {
            warn!(url = %spec.url, "Telemetry sink panicked");
        }
    }
}
