//! Request ID generation and lookup.
//!
//! # Responsibilities
//! - Generate short request IDs for requests that arrive without one
//! - Read the ID back out of request extensions for logs and error bodies
//!
//! # Design Decisions
//! - An incoming ID header is kept as-is; tower-http only fills the gap
//! - IDs are the first 8 hex characters of a UUID v4

use axum::http::{Extensions, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId as HeaderRequestId};
use uuid::Uuid;

/// Shown wherever a request ID is expected but none was set.
pub const MISSING_REQUEST_ID: &str = "-";

/// `MakeRequestId` that produces 8-character IDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShortRequestId;

impl MakeRequestId for ShortRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<HeaderRequestId> {
        HeaderValue::from_str(&generate_request_id()).ok().map(HeaderRequestId::new)
    }
}

pub fn generate_request_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Request ID stored by the request-id layer, if any.
pub fn request_id_of(extensions: &Extensions) -> Option<String> {
    extensions
        .get::<HeaderRequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .map(str::to_owned)
}
