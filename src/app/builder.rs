//! Application assembly.
//!
//! # Responsibilities
//! - Resolve the final, ordered extension list (defaults plus user)
//! - Collect routes, middleware and commands from every extension
//! - Wire the router, lifespan and CLI around one shared registry

use std::any::TypeId;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;

use crate::app::{AppContext, Application};
use crate::cli::{Cli, CliCommand};
use crate::config::Settings;
use crate::ext::{ExceptionExtension, HealthExtension, LoggingExtension};
use crate::http::middleware::{apply_all, Middleware};
use crate::http::routes::{RouteProblem, Routes};
use crate::lifecycle::{Extension, Lifespan};
use crate::registry::Registry;

/// Errors detected while assembling the application.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Route {method} {path} is registered more than once")]
    DuplicateRoute { method: String, path: String },

    #[error("Route path '{path}' must start with '/' and use '{{name}}' captures")]
    InvalidRoutePath { path: String },

    #[error("Route {route} conflicts with an existing route: {reason}")]
    ConflictingRoute { route: String, reason: String },

    #[error("Route {path} uses unsupported method {method}")]
    UnsupportedMethod { method: String, path: String },

    #[error("Command '{name}' is defined more than once")]
    DuplicateCommand { name: String },
}

impl From<RouteProblem> for BuildError {
    fn from(problem: RouteProblem) -> Self {
        match problem {
            RouteProblem::Duplicate(entry) => BuildError::DuplicateRoute {
                method: entry.method.to_string(),
                path: entry.path,
            },
            RouteProblem::InvalidPath(entry) => BuildError::InvalidRoutePath { path: entry.path },
            RouteProblem::UnsupportedMethod(entry) => BuildError::UnsupportedMethod {
                method: entry.method.to_string(),
                path: entry.path,
            },
            RouteProblem::Conflict { route, reason } => BuildError::ConflictingRoute { route, reason },
        }
    }
}

type Deferred = Box<dyn FnOnce(&Settings) -> Arc<dyn Extension> + Send>;

enum Pending {
    Ready(Arc<dyn Extension>),
    Deferred(Deferred),
}

struct Entry {
    type_id: TypeId,
    pending: Pending,
}

type DefaultFactory = fn(&Settings) -> Arc<dyn Extension>;

fn default_extensions() -> [(TypeId, DefaultFactory); 3] {
    [
        (TypeId::of::<LoggingExtension>(), |s| Arc::new(LoggingExtension::new(s)) as Arc<dyn Extension>),
        (TypeId::of::<HealthExtension>(), |s| Arc::new(HealthExtension::new(s)) as Arc<dyn Extension>),
        (TypeId::of::<ExceptionExtension>(), |s| Arc::new(ExceptionExtension::new(s)) as Arc<dyn Extension>),
    ]
}

/// Start assembling an application.
///
/// ```rust,no_run
/// use cuneus::{build_app, Settings};
///
/// # async fn run() -> std::process::ExitCode {
/// let settings = Settings::load().unwrap_or_default();
/// let (_app, cli) = build_app(settings)
///     .routes(|r| {
///         r.get("/", || async { "hello" });
///     })
///     .build()
///     .expect("valid application");
/// cli.run().await
/// # }
/// ```
pub fn build_app(settings: Settings) -> AppBuilder {
    AppBuilder {
        settings,
        extensions: Vec::new(),
        include_defaults: true,
        routes: Routes::new(),
    }
}

/// Builder returned by [`build_app`].
pub struct AppBuilder {
    settings: Settings,
    extensions: Vec<Entry>,
    include_defaults: bool,
    routes: Routes,
}

impl AppBuilder {
    /// Add an extension instance.
    pub fn extension<E: Extension>(mut self, extension: E) -> Self {
        self.extensions.push(Entry {
            type_id: TypeId::of::<E>(),
            pending: Pending::Ready(Arc::new(extension)),
        });
        self
    }

    /// Add an extension built from the final settings.
    pub fn extension_with<E, F>(mut self, factory: F) -> Self
    where
        E: Extension,
        F: FnOnce(&Settings) -> E + Send + 'static,
    {
        let deferred: Deferred = Box::new(move |settings: &Settings| -> Arc<dyn Extension> {
            Arc::new(factory(settings))
        });
        self.extensions.push(Entry {
            type_id: TypeId::of::<E>(),
            pending: Pending::Deferred(deferred),
        });
        self
    }

    /// Whether to install the logging, health and exception extensions.
    pub fn include_defaults(mut self, include: bool) -> Self {
        self.include_defaults = include;
        self
    }

    /// Add application routes.
    pub fn routes<F>(mut self, add: F) -> Self
    where
        F: FnOnce(&mut Routes),
    {
        add(&mut self.routes);
        self
    }

    pub fn build(self) -> Result<(Application, Cli), BuildError> {
        let settings = Arc::new(self.settings);

        let mut extensions: Vec<Arc<dyn Extension>> = Vec::new();
        if self.include_defaults {
            for (type_id, make) in default_extensions() {
                if self.extensions.iter().any(|e| e.type_id == type_id) {
                    continue;
                }
                extensions.push(make(&settings));
            }
        }
        for entry in self.extensions {
            extensions.push(match entry.pending {
                Pending::Ready(extension) => extension,
                Pending::Deferred(factory) => factory(&settings),
            });
        }

        let registry = Registry::new();
        let lifespan = Lifespan::new(extensions.clone(), settings.clone(), registry.clone());
        let context = AppContext::new(settings.clone(), registry, lifespan.published());

        let mut routes = self.routes;
        for extension in &extensions {
            extension.routes(&mut routes);
        }
        let (router, table, problems) = routes.into_parts();
        if let Some(problem) = problems.into_iter().next() {
            return Err(problem.into());
        }

        let middleware: Vec<Middleware> = extensions.iter().flat_map(|e| e.middleware(&context)).collect();
        let router: Router = apply_all(router.with_state(context.clone()), middleware);

        let commands: Vec<CliCommand> = extensions.iter().flat_map(|e| e.commands()).collect();

        tracing::debug!(
            extensions = extensions.len(),
            routes = table.len(),
            commands = commands.len(),
            "Application assembled"
        );

        let app = Application::new(router, lifespan, context, table);
        let cli = Cli::new(app.clone(), commands)?;
        Ok((app, cli))
    }
}
