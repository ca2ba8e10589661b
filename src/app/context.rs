//! Router state shared by every handler.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::Settings;
use crate::lifecycle::LifespanState;
use crate::registry::{Container, Registry};

/// Axum state for the application router.
///
/// Holds the settings, the service registry and a handle to the lifespan
/// state published by the current run.
#[derive(Clone)]
pub struct AppContext {
    settings: Arc<Settings>,
    registry: Registry,
    state: Arc<ArcSwap<LifespanState>>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("app_name", &self.settings.app_name)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub(crate) fn new(settings: Arc<Settings>, registry: Registry, state: Arc<ArcSwap<LifespanState>>) -> Self {
        Self {
            settings,
            registry,
            state,
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Fresh resolution scope over the registry.
    pub fn container(&self) -> Container {
        self.registry.container()
    }

    /// Snapshot of the lifespan state. Empty while the lifespan is not running.
    pub fn lifespan_state(&self) -> Arc<LifespanState> {
        self.state.load_full()
    }
}
