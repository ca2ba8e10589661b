//! Default extensions installed by [`build_app`](crate::build_app).
//!
//! In order: [`LoggingExtension`], [`HealthExtension`], [`ExceptionExtension`].
//! Passing an extension of the same type to the builder replaces the default.

pub mod exceptions;
pub mod health;
pub mod logging;

pub use exceptions::ExceptionExtension;
pub use health::{HealthExtension, HealthResponse, HealthStatus, ServiceHealth};
pub use logging::LoggingExtension;
