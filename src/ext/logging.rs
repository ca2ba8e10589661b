//! Structured logging and request IDs.

use async_trait::async_trait;
use axum::http::HeaderName;
use axum::middleware::from_fn;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

use crate::app::AppContext;
use crate::config::Settings;
use crate::http::middleware::request_log::log_requests;
use crate::http::{Middleware, ShortRequestId};
use crate::lifecycle::{Extension, ExtensionState, LifecycleContext};
use crate::observability::logging::init_logging;
use crate::BoxError;

const FALLBACK_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Default extension that installs the tracing subscriber and adds request
/// ID, span and access-log middleware.
///
/// The subscriber is installed by `setup`, so building an application has no
/// global side effects. An incoming request ID header is kept; otherwise a
/// short ID is generated. Either way it is echoed on the response.
#[derive(Debug, Clone)]
pub struct LoggingExtension {
    header: HeaderName,
}

impl LoggingExtension {
    /// Prepare the middleware for the configured request ID header.
    pub fn new(settings: &Settings) -> Self {
        let header = HeaderName::from_bytes(settings.request_id_header.as_bytes()).unwrap_or_else(|_| {
            tracing::warn!(
                header = %settings.request_id_header,
                "Invalid request ID header name, using x-request-id"
            );
            FALLBACK_HEADER
        });
        Self { header }
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

#[async_trait]
impl Extension for LoggingExtension {
    fn name(&self) -> &str {
        "logging"
    }

    async fn setup(&self, ctx: &LifecycleContext) -> Result<ExtensionState, BoxError> {
        init_logging(ctx.settings());
        Ok(ExtensionState::new())
    }

    fn middleware(&self, _ctx: &AppContext) -> Vec<Middleware> {
        vec![
            Middleware::layer("request_id", SetRequestIdLayer::new(self.header.clone(), ShortRequestId)),
            Middleware::layer("propagate_request_id", PropagateRequestIdLayer::new(self.header.clone())),
            Middleware::new("request_log", |router| router.layer(from_fn(log_requests))),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_from_settings() {
        let settings = Settings {
            request_id_header: "X-Correlation-ID".into(),
            ..Settings::default()
        };
        assert_eq!(LoggingExtension::new(&settings).header().as_str(), "x-correlation-id");

        let bad = Settings {
            request_id_header: "bad header".into(),
            ..Settings::default()
        };
        assert_eq!(LoggingExtension::new(&bad).header(), &FALLBACK_HEADER);
    }

    #[test]
    fn test_building_installs_no_global_subscriber() {
        let (app, _cli) = crate::build_app(Settings::default()).build().unwrap();
        assert!(app.extensions().contains(&"logging"));
        assert!(!tracing::dispatcher::has_been_set());
    }
}
