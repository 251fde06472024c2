//! Prometheus metrics for the trading loop.
//!
//! This module provides metrics for:
//! - Quote ingestion and rejection
//! - Opportunity detection latency and outcomes
//! - Per-leg order latency and latency-budget breaches
//! - Execution outcomes, unwinds and risk trips

use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

// === Metric Name Constants ===

/// Accepted venue quotes.
pub const METRIC_QUOTE_UPDATES: &str = "quote_updates_total";
/// Rejected venue quotes.
pub const METRIC_QUOTES_REJECTED: &str = "quotes_rejected_total";
/// Detection cycle latency.
pub const METRIC_DETECTION_LATENCY: &str = "detection_cycle_latency_ms";
/// Opportunities that passed detection.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// Candidates rejected by the detector, labelled by reason.
pub const METRIC_OPPORTUNITIES_REJECTED: &str = "opportunities_rejected_total";
/// Order book fetch latency.
pub const METRIC_ORDERBOOK_FETCH_LATENCY: &str = "orderbook_fetch_latency_ms";
/// Round-trip latency of single order placements.
pub const METRIC_LEG_LATENCY: &str = "leg_latency_ms";
/// Legs that exceeded their latency budget.
pub const METRIC_LATENCY_BREACHES: &str = "leg_latency_breaches_total";
/// Finished executions, labelled by status.
pub const METRIC_EXECUTIONS: &str = "executions_total";
/// Unwind attempts, labelled by outcome.
pub const METRIC_UNWINDS: &str = "unwinds_total";
/// Pre-trade risk rejections, labelled by reason.
pub const METRIC_RISK_REJECTIONS: &str = "risk_rejections_total";
/// Circuit breaker trips.
pub const METRIC_RISK_TRIPS: &str = "risk_trips_total";

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_DETECTION_LATENCY,
        "Time to scan all fresh quotes for opportunities in milliseconds"
    );
    describe_histogram!(
        METRIC_ORDERBOOK_FETCH_LATENCY,
        "Order book fetch latency in milliseconds"
    );
    describe_histogram!(
        METRIC_LEG_LATENCY,
        "Order placement round-trip latency in milliseconds"
    );

    describe_counter!(METRIC_QUOTE_UPDATES, "Venue quotes accepted by the consolidator");
    describe_counter!(METRIC_QUOTES_REJECTED, "Malformed or unpaired venue quotes");
    describe_counter!(
        METRIC_OPPORTUNITIES_DETECTED,
        "Opportunities that passed every detection gate"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_REJECTED,
        "Candidates rejected by the detector"
    );
    describe_counter!(
        METRIC_LATENCY_BREACHES,
        "Order legs that exceeded the per-leg latency budget"
    );
    describe_counter!(METRIC_EXECUTIONS, "Finished executions by status");
    describe_counter!(METRIC_UNWINDS, "Unwind attempts by outcome");
    describe_counter!(METRIC_RISK_REJECTIONS, "Opportunities blocked by the risk gate");
    describe_counter!(METRIC_RISK_TRIPS, "Circuit breaker trips");

    debug!("Metrics initialized");
}

/// Install the Prometheus recorder once and return its render handle.
pub fn install_prometheus() -> Option<PrometheusHandle> {
    PROMETHEUS
        .get_or_try_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map(|_| handle)
                .map_err(|e| e.to_string())
        })
        .map_err(|e| warn!(error = %e, "Failed to install Prometheus recorder"))
        .ok()
        .cloned()
}

/// Render the Prometheus exposition text, if a recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS.get().map(|h| h.render())
}

fn ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// Increment accepted quote counter.
pub fn inc_quote_updates() {
    counter!(METRIC_QUOTE_UPDATES).increment(1);
}

/// Increment rejected quote counter.
pub fn inc_quotes_rejected() {
    counter!(METRIC_QUOTES_REJECTED).increment(1);
}

/// Increment opportunities detected counter.
pub fn inc_opportunities_detected() {
    counter!(METRIC_OPPORTUNITIES_DETECTED).increment(1);
}

/// Increment detector rejection counter.
pub fn inc_opportunities_rejected(reason: &'static str) {
    counter!(METRIC_OPPORTUNITIES_REJECTED, "reason" => reason).increment(1);
}

/// Record order book fetch latency.
pub fn record_orderbook_fetch_latency(start: Instant, venue: &str) {
    histogram!(METRIC_ORDERBOOK_FETCH_LATENCY, "venue" => venue.to_string())
        .record(ms(start.elapsed()));
}

/// Record one order placement round trip.
pub fn record_leg_latency(venue: &str, elapsed: Duration) {
    histogram!(METRIC_LEG_LATENCY, "venue" => venue.to_string()).record(ms(elapsed));
}

/// Increment latency breach counter.
pub fn inc_latency_breaches(venue: &str) {
    counter!(METRIC_LATENCY_BREACHES, "venue" => venue.to_string()).increment(1);
}

/// Increment execution counter for a final status.
pub fn inc_executions(status: &str) {
    counter!(METRIC_EXECUTIONS, "status" => status.to_string()).increment(1);
}

/// Increment unwind counter.
pub fn inc_unwinds(outcome: &'static str) {
    counter!(METRIC_UNWINDS, "outcome" => outcome).increment(1);
}

/// Increment risk rejection counter.
pub fn inc_risk_rejections(reason: &'static str) {
    counter!(METRIC_RISK_REJECTIONS, "reason" => reason).increment(1);
}

/// Increment circuit breaker trip counter.
pub fn inc_risk_trips() {
    counter!(METRIC_RISK_TRIPS).increment(1);
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
        ms(self.start.elapsed())
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(ms(self.start.elapsed()));
    }
}

/// Create a latency timer for a detection cycle.
pub fn timer_detection() -> LatencyTimer {
    LatencyTimer::new(METRIC_DETECTION_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn latency_timer_measures_time() {
        let timer = LatencyTimer::new("test_metric");
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }

    #[test]
    fn recording_without_recorder_is_a_noop() {
        inc_quote_updates();
        inc_executions("completed");
        record_leg_latency("left", Duration::from_millis(5));
    }
}
