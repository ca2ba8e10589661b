//! Middleware contributed by extensions.
//!
//! A [`Middleware`] is a named transform over the finished router. The
//! application applies the list in reverse so the first entry ends up
//! outermost and sees the request first.

pub mod request_log;

use std::convert::Infallible;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::Route;
use axum::Router;
use tower::{Layer, Service};

type Apply = Box<dyn FnOnce(Router) -> Router + Send>;

pub struct Middleware {
    name: String,
    apply: Apply,
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware").field("name", &self.name).finish()
    }
}

impl Middleware {
    /// Wrap an arbitrary router transform.
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        Self {
            name: name.into(),
            apply: Box::new(apply),
        }
    }

    /// Wrap a tower layer.
    pub fn layer<L>(name: impl Into<String>, layer: L) -> Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(name, move |router: Router| router.layer(layer))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn apply(self, router: Router) -> Router {
        (self.apply)(router)
    }
}

/// Apply a list so that the first entry is outermost.
pub(crate) fn apply_all(router: Router, middleware: Vec<Middleware>) -> Router {
    middleware
        .into_iter()
        .rev()
        .fold(router, |router, m| {
            tracing::debug!(middleware = %m.name(), "Applying middleware");
            m.apply(router)
        })
}
