//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0)
//! - Check that header names and path prefixes are usable by the host
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>
//! - Runs before settings are handed to any extension

use std::fmt;

use axum::http::HeaderName;

use crate::config::schema::Settings;

/// A single semantic problem with a settings value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check every field and collect all problems.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.tracing_level().is_none() {
        errors.push(ValidationError::new(
            "log_level",
            format!("unknown level '{}'", settings.log_level),
        ));
    }

    let prefix = &settings.health_prefix;
    if !prefix.starts_with('/') {
        errors.push(ValidationError::new("health_prefix", "must start with '/'"));
    } else if prefix.len() > 1 && prefix.ends_with('/') {
        errors.push(ValidationError::new("health_prefix", "must not end with '/'"));
    }

    if HeaderName::try_from(settings.request_id_header.as_str()).is_err() {
        errors.push(ValidationError::new(
            "request_id_header",
            format!("'{}' is not a valid header name", settings.request_id_header),
        ));
    }

    if settings.startup_timeout_secs == 0 {
        errors.push(ValidationError::new("startup_timeout_secs", "must be greater than 0"));
    }
    if settings.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown_timeout_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
