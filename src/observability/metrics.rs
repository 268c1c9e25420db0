//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy and interception metrics
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency by method
//! - `firetail_validations_total` (counter): verdicts by phase, outcome
//! - `firetail_validation_duration_seconds` (histogram): validator latency by phase
//! - `firetail_audit_records_total` (counter): audit records by delivery result
//!
//! # Design Decisions
//! - Recorders are free functions over the `metrics` facade; without an
//!   installed exporter they are no-ops
//! - Label values are fixed, low-cardinality strings

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::validator::{ValidationResult, ValidatorError};

/// Install the Prometheus recorder and its HTTP listener. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Outcome label for a validator call.
pub fn validation_outcome(result: &Result<ValidationResult, ValidatorError>) -> &'static str {
    match result {
        Ok(r) if r.is_declined() => "declined",
        Ok(_) => "valid",
        Err(_) => "error",
    }
}

pub fn record_validation(
    phase: &'static str,
    result: &Result<ValidationResult, ValidatorError>,
    start: Instant,
) {
    record_validation_outcome(phase, validation_outcome(result));
    ::metrics::histogram!("firetail_validation_duration_seconds", "phase" => phase)
        .record(start.elapsed().as_secs_f64());
}

/// Count a verdict reached without calling the validator, e.g. `bypassed`.
pub fn record_validation_outcome(phase: &'static str, outcome: &'static str) {
    ::metrics::counter!("firetail_validations_total", "phase" => phase, "outcome" => outcome)
        .increment(1);
}

/// `result` is one of `queued`, `dropped`, `submitted`, `failed`.
pub fn record_audit(result: &'static str, count: u64) {
    ::metrics::counter!("firetail_audit_records_total", "result" => result).increment(count);
}
