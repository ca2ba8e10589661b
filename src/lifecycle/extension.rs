//! The extension contract.
//!
//! An extension is a unit that hooks into the application at two points:
//!
//! - **Build time** (synchronous): contribute routes, middleware and CLI
//!   commands while the router is assembled.
//! - **Run time** (async): `setup` when the lifespan starts, `teardown` when
//!   it stops. Setup can register services and return state to merge into
//!   the lifespan state.
//!
//! ```rust,no_run
//! use cuneus::{async_trait, BoxError, Extension, ExtensionState, LifecycleContext};
//!
//! struct Cache {
//!     url: String,
//! }
//!
//! struct CacheExtension;
//!
//! #[async_trait]
//! impl Extension for CacheExtension {
//!     fn name(&self) -> &str {
//!         "cache"
//!     }
//!
//!     async fn setup(&self, ctx: &LifecycleContext) -> Result<ExtensionState, BoxError> {
//!         let url: String = ctx.settings().require(self.name(), "cache_url")?;
//!         ctx.registry().register_value(Cache { url: url.clone() });
//!         Ok(ExtensionState::new().with("cache_url", url))
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::AppContext;
use crate::cli::CliCommand;
use crate::config::Settings;
use crate::http::middleware::Middleware;
use crate::http::routes::Routes;
use crate::lifecycle::state::ExtensionState;
use crate::registry::Registry;
use crate::BoxError;

/// What an extension sees during setup and teardown.
#[derive(Clone, Debug)]
pub struct LifecycleContext {
    settings: Arc<Settings>,
    registry: Registry,
}

impl LifecycleContext {
    pub fn new(settings: Arc<Settings>, registry: Registry) -> Self {
        Self { settings, registry }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// A pluggable unit of application lifecycle behavior.
#[async_trait]
pub trait Extension: Send + Sync + 'static {
    /// Name used in logs, metrics and error messages.
    fn name(&self) -> &str;

    /// Add routes to the application router.
    fn routes(&self, _routes: &mut Routes) {}

    /// Middleware to wrap around the router. The first entry is outermost.
    fn middleware(&self, _ctx: &AppContext) -> Vec<Middleware> {
        Vec::new()
    }

    /// Commands to add to the application CLI.
    fn commands(&self) -> Vec<CliCommand> {
        Vec::new()
    }

    /// Startup hook. Runs in extension order.
    async fn setup(&self, _ctx: &LifecycleContext) -> Result<ExtensionState, BoxError> {
        Ok(ExtensionState::new())
    }

    /// Shutdown hook. Runs in reverse extension order, only for extensions
    /// whose setup succeeded.
    async fn teardown(&self, _ctx: &LifecycleContext) -> Result<(), BoxError> {
        Ok(())
    }
}
