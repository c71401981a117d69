//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): every request by outcome and route class
//! - `gate_rejections_total` (counter): admission rejections by reason
//! - `gate_request_duration_seconds` (histogram): time spent per forwarded request
//! - `gate_upstream_errors_total` (counter): upstream failures by kind
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! embedders without an exporter pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// A request finished, either forwarded or rejected.
///
/// `outcome` is `forwarded` or the rejection reason.
pub fn record_request(outcome: &'static str, class: &'static str, started: Instant) {
    metrics::counter!("gate_requests_total", "outcome" => outcome, "class" => class).increment(1);
    metrics::histogram!("gate_request_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

/// A request was refused by the admission pipeline.
pub fn record_rejection(reason: &'static str) {
    metrics::counter!("gate_rejections_total", "reason" => reason).increment(1);
}

/// The upstream could not be reached or timed out.
pub fn record_upstream_error(kind: &'static str) {
    metrics::counter!("gate_upstream_errors_total", "kind" => kind).increment(1);
}
