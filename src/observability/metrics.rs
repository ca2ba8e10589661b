//! Metrics collection.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status
//! - `http_request_duration_seconds` (histogram): latency by method
//! - `extension_lifecycle_total` (counter): setup/teardown by extension, outcome
//! - `extension_lifecycle_duration_seconds` (histogram): setup/teardown time
//!
//! Without an installed recorder these calls are no-ops.

use std::time::Instant;

/// Record one completed HTTP request.
pub fn record_request(method: &str, status: u16, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();

    ::metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    ::metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(elapsed);
}

/// Record one extension setup or teardown.
pub fn record_extension(extension: &str, phase: &'static str, ok: bool, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    let outcome = if ok { "ok" } else { "error" };

    ::metrics::counter!(
        "extension_lifecycle_total",
        "extension" => extension.to_string(),
        "phase" => phase,
        "outcome" => outcome
    )
    .increment(1);

    ::metrics::histogram!(
        "extension_lifecycle_duration_seconds",
        "extension" => extension.to_string(),
        "phase" => phase
    )
    .record(elapsed);
}
