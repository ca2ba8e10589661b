//! Application errors rendered as consistent JSON responses.
//!
//! Handlers return `Result<_, AppError>`. The error renders itself as
//!
//! ```json
//! {"error": {"status": 404, "code": "not_found", "message": "Resource not found"}}
//! ```
//!
//! and leaves a copy of itself in the response extensions so the exception
//! middleware can log it and add the request ID.

use std::borrow::Cow;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lifecycle::StateError;
use crate::registry::RegistryError;

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// An error with an HTTP status, a stable machine-readable code and a
/// human-readable message.
#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: Cow<'static, str>,
    message: Cow<'static, str>,
    details: Option<Value>,
    retry_after: Option<u64>,
}

impl AppError {
    fn preset(status: StatusCode, code: &'static str, message: &'static str) -> Self {
        Self {
            status,
            code: Cow::Borrowed(code),
            message: Cow::Borrowed(message),
            details: None,
            retry_after: None,
        }
    }

    pub fn internal() -> Self {
        Self::preset(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "An unexpected error occurred")
    }

    pub fn bad_request() -> Self {
        Self::preset(StatusCode::BAD_REQUEST, "bad_request", "Invalid request")
    }

    pub fn unauthorized() -> Self {
        Self::preset(StatusCode::UNAUTHORIZED, "unauthorized", "Authentication required")
    }

    pub fn forbidden() -> Self {
        Self::preset(StatusCode::FORBIDDEN, "forbidden", "Access denied")
    }

    pub fn not_found() -> Self {
        Self::preset(StatusCode::NOT_FOUND, "not_found", "Resource not found")
    }

    pub fn conflict() -> Self {
        Self::preset(StatusCode::CONFLICT, "conflict", "Resource conflict")
    }

    /// 429, with an optional `Retry-After` in seconds.
    pub fn rate_limited(retry_after: Option<u64>) -> Self {
        Self {
            retry_after,
            ..Self::preset(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "Too many requests")
        }
    }

    pub fn service_unavailable() -> Self {
        Self::preset(
            StatusCode::SERVICE_UNAVAILABLE,
            "service_unavailable",
            "Service temporarily unavailable",
        )
    }

    pub fn database_error() -> Self {
        Self::preset(StatusCode::SERVICE_UNAVAILABLE, "database_error", "Database operation failed")
    }

    pub fn cache_error() -> Self {
        Self::preset(StatusCode::SERVICE_UNAVAILABLE, "cache_error", "Cache operation failed")
    }

    pub fn external_service_error() -> Self {
        Self::preset(
            StatusCode::BAD_GATEWAY,
            "external_service_error",
            "External service request failed",
        )
    }

    pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_code(mut self, code: impl Into<Cow<'static, str>>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Response body for this error.
    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetails {
                status: Some(self.status.as_u16()),
                code: self.code.to_string(),
                message: self.message.to_string(),
                request_id,
                details: self.details.clone(),
            },
        }
    }

    /// Render with a request ID in the body.
    pub fn into_response_with(self, request_id: Option<String>) -> Response {
        let body = self.to_response(request_id);
        let mut response = (self.status, Json(body)).into_response();

        if let Some(secs) = self.retry_after.filter(|s| *s > 0) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response.extensions_mut().insert(self);
        response
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with(None)
    }
}

impl From<StateError> for AppError {
    fn from(err: StateError) -> Self {
        tracing::error!(error = %err, "Lifespan state lookup failed");
        AppError::internal()
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        tracing::error!(error = %err, "Service resolution failed");
        match err {
            RegistryError::Factory { .. } => AppError::service_unavailable(),
            _ => AppError::internal(),
        }
    }
}
