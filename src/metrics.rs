//! Prometheus metrics for feeds, scans and the simulated ledger.
//!
//! This module provides metrics for:
//! - Scan cycle latency and candidate funnel
//! - Order book fetch latency
//! - WebSocket message, decode-failure and reconnect counts
//! - REST cache fallbacks and capability probe timeouts
//! - Ledger entries and exits

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Scan cycle latency metric name.
pub const METRIC_SCAN_LATENCY: &str = "scan_latency_ms";
/// Order book fetch latency metric name.
pub const METRIC_ORDERBOOK_FETCH_LATENCY: &str = "orderbook_fetch_latency_ms";
/// WebSocket message latency metric name.
pub const METRIC_WS_MESSAGE_LATENCY: &str = "ws_message_latency_ms";
/// Candidates evaluated counter metric name.
pub const METRIC_CANDIDATES: &str = "scan_candidates_total";
/// Opportunities detected counter metric name.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// WebSocket messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// Undecodable frames counter metric name.
pub const METRIC_WS_DECODE_FAILURES: &str = "ws_decode_failures_total";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";
/// REST failures answered from cache counter metric name.
pub const METRIC_REST_CACHE_FALLBACKS: &str = "rest_cache_fallbacks_total";
/// Probe timeouts counter metric name.
pub const METRIC_PROBE_TIMEOUTS: &str = "probe_timeouts_total";
/// Ledger entries counter metric name.
pub const METRIC_POSITIONS_OPENED: &str = "positions_opened_total";
/// Ledger exits counter metric name.
pub const METRIC_POSITIONS_CLOSED: &str = "positions_closed_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(METRIC_SCAN_LATENCY, "Full scan cycle latency in milliseconds");
    describe_histogram!(
        METRIC_ORDERBOOK_FETCH_LATENCY,
        "Order book fetch latency in milliseconds"
    );
    describe_histogram!(
        METRIC_WS_MESSAGE_LATENCY,
        "WebSocket frame decode and apply latency in milliseconds"
    );

    describe_counter!(METRIC_CANDIDATES, "Cross-venue candidate pairs evaluated");
    describe_counter!(
        METRIC_OPPORTUNITIES_DETECTED,
        "Total number of arbitrage opportunities detected"
    );
    describe_counter!(
        METRIC_WS_MESSAGES_RECEIVED,
        "Total number of WebSocket messages received"
    );
    describe_counter!(
        METRIC_WS_DECODE_FAILURES,
        "WebSocket frames dropped because they could not be decoded"
    );
    describe_counter!(
        METRIC_WS_RECONNECTS,
        "Total number of WebSocket reconnections"
    );
    describe_counter!(
        METRIC_REST_CACHE_FALLBACKS,
        "REST failures answered from the last cached response"
    );
    describe_counter!(METRIC_PROBE_TIMEOUTS, "Deadline-bounded probes that timed out");
    describe_counter!(METRIC_POSITIONS_OPENED, "Simulated positions opened");
    describe_counter!(METRIC_POSITIONS_CLOSED, "Simulated positions closed");

    debug!("Metrics initialized");
}

/// Record a full scan cycle.
pub fn record_scan_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_SCAN_LATENCY).record(latency_ms);
}

/// Record order book fetch latency.
pub fn record_orderbook_fetch_latency(start: Instant, venue: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_ORDERBOOK_FETCH_LATENCY, "venue" => venue.to_string()).record(latency_ms);
}

/// Record WebSocket message processing latency.
pub fn record_ws_message_latency(start: Instant, venue: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_WS_MESSAGE_LATENCY, "venue" => venue.to_string()).record(latency_ms);
}

/// Add evaluated candidate pairs.
pub fn add_candidates(count: u64) {
    counter!(METRIC_CANDIDATES).increment(count);
}

/// Add detected opportunities.
pub fn add_opportunities_detected(count: u64) {
    counter!(METRIC_OPPORTUNITIES_DETECTED).increment(count);
}

/// Increment WebSocket messages received counter.
pub fn inc_ws_messages_received(venue: &str) {
    counter!(METRIC_WS_MESSAGES_RECEIVED, "venue" => venue.to_string()).increment(1);
}

/// Increment undecodable frame counter.
pub fn inc_ws_decode_failures(venue: &str) {
    counter!(METRIC_WS_DECODE_FAILURES, "venue" => venue.to_string()).increment(1);
}

/// Increment WebSocket reconnects counter.
pub fn inc_ws_reconnects(venue: &str) {
    counter!(METRIC_WS_RECONNECTS, "venue" => venue.to_string()).increment(1);
}

/// Increment REST cache fallback counter.
pub fn inc_rest_cache_fallbacks(venue: &str) {
    counter!(METRIC_REST_CACHE_FALLBACKS, "venue" => venue.to_string()).increment(1);
}

/// Increment probe timeout counter.
pub fn inc_probe_timeouts(probe: &str) {
    counter!(METRIC_PROBE_TIMEOUTS, "probe" => probe.to_string()).increment(1);
}

/// Increment positions opened counter.
pub fn inc_positions_opened() {
    counter!(METRIC_POSITIONS_OPENED).increment(1);
}

/// Increment positions closed counter.
pub fn inc_positions_closed() {
    counter!(METRIC_POSITIONS_CLOSED).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for a scan cycle.
pub fn timer_scan() -> LatencyTimer {
    LatencyTimer::new(METRIC_SCAN_LATENCY)
}
