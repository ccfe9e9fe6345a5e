//! Metrics collection and exposition.
//!
//! # Metrics
//! - `app_requests_total` (counter): requests by method, status, outcome
//! - `app_request_duration_seconds` (histogram): latency distribution
//! - `app_csrf_rejections_total` (counter): rejected state-changing requests
//! - `app_route_reloads_total` (counter): handler unit reloads by result
//!
//! Recording is a no-op until a recorder is installed, so the pipeline can
//! record unconditionally.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, outcome: &'static str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("app_requests_total", &labels).increment(1);
    histogram!("app_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// Record a CSRF rejection.
pub fn record_csrf_rejection() {
    counter!("app_csrf_rejections_total").increment(1);
}

/// Record a handler unit reload.
pub fn record_route_reload(result: &'static str) {
    counter!("app_route_reloads_total", "result" => result).increment(1);
}
