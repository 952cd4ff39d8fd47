//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_route_cache_total` (counter): route cache reads by result
//! - `gateway_routes_loaded` (gauge): size of the active route snapshot
//! - `gateway_blacklist_blocked_total` (counter): rejected client IPs
//! - `gateway_audit_dropped_total` (counter): audit records lost to a full queue
//! - `gateway_rate_limited_total` (counter): 429s by route
//!
//! Every recorder is a no-op until [`init_metrics`] installs the exporter.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Outcome of a route cache read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    Corrupt,
}

impl CacheOutcome {
    fn as_str(self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Corrupt => "corrupt",
        }
    }
}

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [("method", method.to_string()), ("status", status.to_string())];
    metrics::counter!("gateway_requests_total", &labels).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_route_cache(outcome: CacheOutcome) {
    metrics::counter!("gateway_route_cache_total", "result" => outcome.as_str()).increment(1);
}

pub fn record_routes_loaded(count: usize) {
    metrics::gauge!("gateway_routes_loaded").set(count as f64);
}

pub fn record_blocked() {
    metrics::counter!("gateway_blacklist_blocked_total").increment(1);
}

pub fn record_audit_dropped() {
    metrics::counter!("gateway_audit_dropped_total").increment(1);
}

pub fn record_rate_limited(route_id: &str) {
    metrics::counter!("gateway_rate_limited_total", "route" => route_id.to_string()).increment(1);
}
