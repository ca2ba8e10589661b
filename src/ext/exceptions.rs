//! Consistent error responses.
//!
//! # Responsibilities
//! - Turn panics in handlers into generic 500 responses
//! - Add the request ID to every [`AppError`] body
//! - Log server errors at error level and client errors at warn
//!
//! # Design Decisions
//! - Panic details are only exposed when `debug` is on
//! - Errors are recognized by the `AppError` copy left in the response
//!   extensions; other responses pass through untouched

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;

use crate::app::AppContext;
use crate::config::Settings;
use crate::http::request::request_id_of;
use crate::http::{AppError, Middleware};
use crate::lifecycle::Extension;

/// Default extension rendering errors and panics as JSON.
#[derive(Debug, Clone)]
pub struct ExceptionExtension {
    debug: bool,
    log_server_errors: bool,
}

impl ExceptionExtension {
    pub fn new(settings: &Settings) -> Self {
        Self {
            debug: settings.debug,
            log_server_errors: settings.log_server_errors,
        }
    }
}

#[async_trait]
impl Extension for ExceptionExtension {
    fn name(&self) -> &str {
        "exceptions"
    }

    fn middleware(&self, _ctx: &AppContext) -> Vec<Middleware> {
        let policy = Arc::new(self.clone());
        let debug = self.debug;
        vec![
            Middleware::new("render_errors", move |router| {
                router.layer(from_fn_with_state(policy, render_errors))
            }),
            Middleware::layer(
                "catch_panic",
                CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| panic_response(panic, debug)),
            ),
        ]
    }
}

async fn render_errors(State(policy): State<Arc<ExceptionExtension>>, request: Request, next: Next) -> Response {
    let request_id = request_id_of(request.extensions());
    let response = next.run(request).await;

    let Some(error) = response.extensions().get::<AppError>().cloned() else {
        return response;
    };

    if error.is_server_error() && policy.log_server_errors {
        tracing::error!(
            error_code = %error.code(),
            status = error.status().as_u16(),
            message = %error.message(),
            "Server error"
        );
    } else {
        tracing::warn!(
            error_code = %error.code(),
            status = error.status().as_u16(),
            message = %error.message(),
            "Client error"
        );
    }

    if request_id.is_none() {
        return response;
    }
    error.into_response_with(request_id)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>, debug: bool) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };

    tracing::error!(panic = %message, "Unexpected error");

    let error = AppError::internal();
    let error = if debug {
        error.with_details(json!({"exception": "panic", "message": message}))
    } else {
        error
    };
    error.into_response()
}
