//! Rolling-window rate limiting for Microsoft Graph API
//!
//! Intune Graph endpoints enforce both a total-request quota and a stricter
//! write-request quota over a rolling window. [`RateLimiter`] tracks both
//! windows, answers admission checks, and computes two kinds of delay:
//! proactive throttling (a linear ramp above 80% utilization, plus a cooldown
//! after an observed 429) and reactive retry backoff (Retry-After header or
//! jittered exponential).
//!
//! ## Architecture
//!
//! All window state lives behind a single `Mutex` held only for the state
//! read/write itself, never across a sleep or network call. Timestamps use
//! `tokio::time::Instant` so tests can drive window expiry with the paused
//! test clock.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mgraph_client::rate_limit::{RateLimiter, RateLimiterConfig};
//!
//! # async fn example() {
//! let limiter = RateLimiter::with_defaults();
//! while !limiter.can_make_request(true) {
//!     tokio::time::sleep(limiter.calculate_delay(true)).await;
//! }
//! limiter.record_request(true);
//! // ... make API call ...
//! limiter.reset_rate_limit_tracking();
//! # }
//! ```

use std::{collections::VecDeque, sync::Mutex, time::Duration};

use mgraph_core::error::{GraphError, GraphErrorCategory};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long after a 429 the extra cooldown delay stays active.
const RATE_LIMIT_COOLDOWN_WINDOW: Duration = Duration::from_secs(60);

/// Upper bound for the post-429 cooldown delay.
const MAX_COOLDOWN_SECS: f64 = 10.0;

/// Hard cap on Graph `$batch` payload size.
const MAX_BATCH_SIZE: usize = 20;

/// Configuration for the rolling-window rate limiter.
///
/// The defaults mirror the Intune Graph service limits (100 writes / 1000
/// total per 20-second window). The proactive-delay ramp and cooldown
/// constants are empirically chosen and deliberately kept as-is.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum mutating requests (POST/PUT/PATCH/DELETE) per window
    pub max_write_requests_per_window: usize,
    /// Maximum requests of any method per window
    pub max_total_requests_per_window: usize,
    /// Rolling window duration
    pub window: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// First-attempt backoff before jitter
    pub base_retry_delay: Duration,
    /// Cap on any computed backoff delay
    pub max_retry_delay: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_write_requests_per_window: 100,
            max_total_requests_per_window: 1000,
            window: Duration::from_secs(20),
            max_retries: 3,
            base_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(32),
        }
    }
}

/// Window state protected by the limiter's mutex.
#[derive(Debug, Default)]
struct WindowState {
    /// Timestamps of all requests in the window, oldest first
    request_times: VecDeque<Instant>,
    /// Subsequence of timestamps for write requests only
    write_request_times: VecDeque<Instant>,
    /// When the most recent 429 was observed
    last_rate_limit: Option<Instant>,
    /// 429s seen since the last non-429 response
    consecutive_rate_limits: u32,
}

impl WindowState {
    /// Drops timestamps older than the window. Called lazily at the start of
    /// every read or write so the sequences never serve stale counts.
    fn prune(&mut self, now: Instant, window: Duration) {
        while self
            .request_times
            .front()
            .is_some_and(|&t| now.duration_since(t) > window)
        {
            self.request_times.pop_front();
        }
        while self
            .write_request_times
            .front()
            .is_some_and(|&t| now.duration_since(t) > window)
        {
            self.write_request_times.pop_front();
        }
    }
}

/// Rolling-window rate limiter mirroring Intune Graph constraints.
///
/// Safe to share across concurrent in-flight requests via `Arc`; every
/// operation takes the internal lock only for the state access.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Limiter with the default Intune Graph quotas.
    pub fn with_defaults() -> Self {
        Self::new(RateLimiterConfig::default())
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Whether a new request may be sent without exceeding a quota.
    pub fn can_make_request(&self, is_write: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        state.prune(Instant::now(), self.config.window);
        let total = state.request_times.len();
        let writes = state.write_request_times.len();

        if total >= self.config.max_total_requests_per_window {
            debug!(
                total,
                limit = self.config.max_total_requests_per_window,
                "Approaching total rate limit"
            );
            return false;
        }
        if is_write && writes >= self.config.max_write_requests_per_window {
            debug!(
                writes,
                limit = self.config.max_write_requests_per_window,
                "Approaching write rate limit"
            );
            return false;
        }
        true
    }

    /// Counts a request against the window quotas.
    pub fn record_request(&self, is_write: bool) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        state.request_times.push_back(now);
        if is_write {
            state.write_request_times.push_back(now);
        }
        // Opportunistic prune so an admission-starved burst cannot grow the
        // sequences without bound.
        if state.request_times.len() > self.config.max_total_requests_per_window * 2 {
            state.prune(now, self.config.window);
        }
    }

    /// Records an observed 429 response.
    pub fn record_rate_limit(&self) {
        let mut state = self.state.lock().unwrap();
        state.last_rate_limit = Some(Instant::now());
        state.consecutive_rate_limits += 1;
        warn!(
            consecutive = state.consecutive_rate_limits,
            "Rate limit encountered"
        );
    }

    /// Clears the consecutive-429 counter after any non-429 response.
    pub fn reset_rate_limit_tracking(&self) {
        let mut state = self.state.lock().unwrap();
        if state.consecutive_rate_limits > 0 {
            info!("Resetting rate limit tracking");
        }
        state.consecutive_rate_limits = 0;
    }

    /// Proactive delay to apply before sending.
    ///
    /// Within 60 seconds of a 429, returns a cooldown of 2 seconds per
    /// consecutive 429 (capped at 10). Otherwise ramps linearly from zero at
    /// 80% window utilization to one second at 100%.
    pub fn calculate_delay(&self, is_write: bool) -> Duration {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        state.prune(now, self.config.window);

        if let Some(last) = state.last_rate_limit {
            if now.duration_since(last) < RATE_LIMIT_COOLDOWN_WINDOW {
                let extra =
                    (f64::from(state.consecutive_rate_limits) * 2.0).min(MAX_COOLDOWN_SECS);
                return Duration::from_secs_f64(extra);
            }
        }

        if is_write {
            let utilization = state.write_request_times.len() as f64
                / self.config.max_write_requests_per_window as f64;
            if utilization > 0.8 {
                return Duration::from_secs_f64(0.5 * (utilization - 0.8) * 10.0);
            }
        }

        let utilization_total =
            state.request_times.len() as f64 / self.config.max_total_requests_per_window as f64;
        if utilization_total > 0.8 {
            return Duration::from_secs_f64(0.5 * (utilization_total - 0.8) * 10.0);
        }
        Duration::ZERO
    }

    /// Reactive backoff delay for a retry attempt (1-based).
    ///
    /// A parseable `Retry-After` header wins: numeric values are used
    /// verbatim, HTTP-dates as the remaining time capped at one hour.
    /// Otherwise exponential backoff from the base delay, jittered by a
    /// uniform factor in [0.8, 1.2] and capped at the configured maximum.
    pub fn calculate_retry_delay(&self, attempt: u32, retry_after_header: Option<&str>) -> Duration {
        if let Some(header) = retry_after_header {
            if let Some(delay) = parse_retry_after(header) {
                info!(delay_ms = delay.as_millis() as u64, "Using Retry-After header");
                return delay;
            }
            debug!(header, "Invalid Retry-After header");
        }

        let exponent = attempt.saturating_sub(1).min(31);
        let exponential =
            self.config.base_retry_delay.as_secs_f64() * f64::from(1u32 << exponent);
        let jittered = exponential * rand::thread_rng().gen_range(0.8..=1.2);
        let delay = jittered.min(self.config.max_retry_delay.as_secs_f64());
        info!(delay_secs = delay, attempt, "Calculated retry delay");
        Duration::from_secs_f64(delay)
    }

    /// Whether a failed attempt should be retried.
    ///
    /// Taxonomy errors decide via their category / `is_retriable`; transport
    /// timeouts are always transient. The substring heuristic is a last
    /// resort for errors that never passed through the taxonomy.
    pub fn should_retry(&self, attempt: u32, error: &(dyn std::error::Error + 'static)) -> bool {
        if attempt > self.config.max_retries {
            warn!(attempt, "Maximum retries exceeded");
            return false;
        }

        if let Some(error) = error.downcast_ref::<reqwest::Error>() {
            if error.is_timeout() || error.is_connect() {
                return true;
            }
        }

        if let Some(error) = error.downcast_ref::<GraphError>() {
            return matches!(
                error.category,
                GraphErrorCategory::RateLimit | GraphErrorCategory::Network
            ) || error.is_retriable();
        }

        let message = error.to_string().to_lowercase();
        if ["429", "rate", "timeout"].iter().any(|s| message.contains(s)) {
            return true;
        }
        ["500", "502", "503", "504"]
            .iter()
            .any(|s| message.contains(s))
    }

    /// Batch size that keeps 20% headroom in the tighter of the two quotas,
    /// capped at the Graph `$batch` limit of 20.
    pub fn calculate_optimal_batch_size(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.prune(Instant::now(), self.config.window);
        let remaining_total = self
            .config
            .max_total_requests_per_window
            .saturating_sub(state.request_times.len());
        let remaining_write = self
            .config
            .max_write_requests_per_window
            .saturating_sub(state.write_request_times.len());
        let capacity = remaining_total.min(remaining_write).max(1);
        let safe_capacity = (capacity as f64 * 0.8) as usize;
        safe_capacity.clamp(1, MAX_BATCH_SIZE)
    }

    /// Partitions items into consecutive quota-respecting chunks.
    pub fn split_into_batches<T>(&self, items: Vec<T>, is_write: bool) -> Vec<Vec<T>> {
        let batch_size = self.calculate_optimal_batch_size();
        let total = items.len();
        let mut batches = Vec::with_capacity(total.div_ceil(batch_size.max(1)));
        let mut items = items.into_iter();
        loop {
            let chunk: Vec<T> = items.by_ref().take(batch_size).collect();
            if chunk.is_empty() {
                break;
            }
            batches.push(chunk);
        }
        info!(
            total,
            batches = batches.len(),
            batch_size,
            write = is_write,
            "Split items into batches"
        );
        batches
    }

    /// Current (total, write) counts after pruning. Exposed for observability
    /// and tests.
    pub fn window_counts(&self) -> (usize, usize) {
        let mut state = self.state.lock().unwrap();
        state.prune(Instant::now(), self.config.window);
        (state.request_times.len(), state.write_request_times.len())
    }

    /// 429s observed since the last non-429 response.
    pub fn consecutive_rate_limits(&self) -> u32 {
        self.state.lock().unwrap().consecutive_rate_limits
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// The header can be either a number of seconds (e.g., "30") or an HTTP-date
/// (e.g., "Fri, 31 Dec 2025 23:59:59 GMT") parsed as seconds from now and
/// capped at one hour. Returns `None` if the value is unparseable.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Some(Duration::from_secs_f64(seconds));
        }
        return None;
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(trimmed) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            let secs: Option<u64> = (target - now).num_seconds().try_into().ok();
            return secs.filter(|&s| s <= 3600).map(Duration::from_secs);
        }
        return Some(Duration::ZERO);
    }
    None
}
