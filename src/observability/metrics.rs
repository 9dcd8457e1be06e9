//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hotroute_requests_total` (counter): requests by method, status
//! - `hotroute_request_duration_seconds` (histogram): latency distribution
//! - `hotroute_bundle_scans_total` (counter): bundle scans by kind, outcome
//! - `hotroute_registry_entries` (gauge): registered mappings by kind
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library users pay nothing
//! - The Prometheus exporter is opt-in from the binary

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter on `addr` and describe all metrics.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("hotroute_requests_total", "Total HTTP requests by method and status");
    describe_histogram!("hotroute_request_duration_seconds", "Request handling latency in seconds");
    describe_counter!("hotroute_bundle_scans_total", "Bundle scans by registry kind and outcome");
    describe_gauge!("hotroute_registry_entries", "Registered mappings by registry kind");
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "hotroute_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("hotroute_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_bundle_scan(kind: &'static str, outcome: &'static str) {
    counter!("hotroute_bundle_scans_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_registry_size(kind: &'static str, size: usize) {
    gauge!("hotroute_registry_entries", "kind" => kind).set(size as f64);
}
