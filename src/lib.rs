//! Lifespan orchestration, service registry and extension wiring for axum
//! applications.
//!
//! An application is a list of [`Extension`]s. At build time each one may
//! contribute routes, middleware and CLI commands. At run time their setup
//! hooks run in order under one [`Lifespan`], registering services in a
//! shared [`Registry`] and contributing state; teardown runs in reverse.
//!
//! ```rust,no_run
//! use cuneus::{build_app, Settings};
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let settings = Settings::load().unwrap_or_default();
//!     let (_app, cli) = build_app(settings).build().expect("valid application");
//!     cli.run().await
//! }
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod ext;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;

/// Error type for failures raised by extensions, factories and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use async_trait::async_trait;

pub use app::{build_app, AppBuilder, AppContext, Application, BuildError, ServeError};
pub use cli::{Cli, CliCommand, CliError, CommandContext};
pub use config::{Settings, SettingsError, SettingsLoader};
pub use http::{AppError, AppSettings, Middleware, RequestId, Routes, Services, SharedState, Svc};
pub use lifecycle::{
    Extension, ExtensionState, LifecycleContext, Lifespan, LifespanError, LifespanGuard, LifespanState,
    Shutdown, ShutdownReport,
};
pub use registry::{Container, Registry, RegistryError};
