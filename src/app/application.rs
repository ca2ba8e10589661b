//! The assembled application.
//!
//! # Responsibilities
//! - Expose the finished router for in-process testing
//! - Run the lifespan around an HTTP server with graceful shutdown

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::app::AppContext;
use crate::config::Settings;
use crate::http::RouteEntry;
use crate::lifecycle::signals::shutdown_signal;
use crate::lifecycle::{Lifespan, LifespanError, LifespanGuard, ShutdownReport};
use crate::registry::Registry;

/// Errors from running the server.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lifespan(#[from] LifespanError),
}

struct AppInner {
    router: Router,
    lifespan: Lifespan,
    context: AppContext,
    routes: Vec<RouteEntry>,
}

/// A built application: router, lifespan and shared context.
///
/// Cloning is cheap.
#[derive(Clone)]
pub struct Application {
    inner: Arc<AppInner>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("extensions", &self.extensions())
            .field("routes", &self.inner.routes.len())
            .finish()
    }
}

impl Application {
    pub(crate) fn new(router: Router, lifespan: Lifespan, context: AppContext, routes: Vec<RouteEntry>) -> Self {
        Self {
            inner: Arc::new(AppInner {
                router,
                lifespan,
                context,
                routes,
            }),
        }
    }

    /// The router with all extension middleware applied.
    pub fn router(&self) -> Router {
        self.inner.router.clone()
    }

    /// Registry shared by extensions and handlers; use it for test overrides.
    pub fn registry(&self) -> &Registry {
        self.inner.context.registry()
    }

    pub fn settings(&self) -> &Settings {
        self.inner.context.settings()
    }

    pub fn context(&self) -> &AppContext {
        &self.inner.context
    }

    pub fn lifespan(&self) -> &Lifespan {
        &self.inner.lifespan
    }

    /// Routes registered through [`Routes`](crate::http::Routes), in order.
    pub fn routes(&self) -> &[RouteEntry] {
        &self.inner.routes
    }

    /// Extension names in lifecycle order.
    pub fn extensions(&self) -> Vec<&str> {
        self.inner.lifespan.extension_names()
    }

    /// Run every extension's setup.
    pub async fn start(&self) -> Result<LifespanGuard, LifespanError> {
        self.inner.lifespan.startup().await
    }

    /// Start the lifespan, serve until `shutdown` resolves, then tear down.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<ShutdownReport, ServeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = listener.local_addr()?;
        let guard = self.start().await?;

        tracing::info!(
            address = %address,
            app = %self.settings().app_name,
            "HTTP server starting"
        );

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        tracing::info!("HTTP server stopped");

        let report = guard.shutdown().await;
        served?;
        Ok(report)
    }

    /// Bind `address` and serve until SIGINT or SIGTERM.
    pub async fn serve_until_signal(&self, address: &str) -> Result<ShutdownReport, ServeError> {
        let listener = TcpListener::bind(address).await.map_err(|source| ServeError::Bind {
            address: address.to_string(),
            source,
        })?;
        self.serve(listener, shutdown_signal()).await
    }
}
