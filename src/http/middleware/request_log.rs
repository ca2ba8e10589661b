//! Per-request span and access log.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use crate::http::request::{request_id_of, MISSING_REQUEST_ID};
use crate::observability::metrics;

/// Wrap the request in a span carrying its ID, method and path, then log
/// `"<METHOD> <path> <status>"` with the elapsed time once it completes.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let request_id = request_id_of(request.extensions()).unwrap_or_else(|| MISSING_REQUEST_ID.to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let response = next.run(request).instrument(span.clone()).await;
    let status = response.status().as_u16();
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    span.in_scope(|| {
        tracing::info!(
            status_code = status,
            duration_ms = (duration_ms * 100.0).round() / 100.0,
            "{} {} {}",
            method,
            path,
            status
        );
    });
    metrics::record_request(method.as_str(), status, started);

    response
}
