//! Observability types for the request executor
//!
//! One [`TelemetryEvent`] is emitted per terminal outcome of a logical
//! request, covering all of its retries. The sink is purely observational:
//! it never affects control flow, and the executor isolates itself from
//! sink panics.

use serde::Serialize;

use crate::error::GraphErrorCategory;

/// Structured record describing one completed (possibly retried) request.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub method: String,
    pub url: String,
    /// Final HTTP status, absent if no response was ever received
    pub status_code: Option<u16>,
    /// Wall-clock duration across all attempts
    pub duration_ms: f64,
    /// Retries consumed (0 when the first attempt settled the request)
    pub retries: u32,
    /// Failure category, absent on success
    pub category: Option<GraphErrorCategory>,
    pub success: bool,
}

/// Injected observer receiving one event per completed logical request.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &TelemetryEvent);
}

impl<F> TelemetrySink for F
where
    F: Fn(&TelemetryEvent) + Send + Sync,
{
    fn record(&self, event: &TelemetryEvent) {
        self(event)
    }
}
