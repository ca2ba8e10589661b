//! Application assembly and hosting.
//!
//! # Data Flow
//! ```text
//! Settings
//!     → builder.rs (defaults + user extensions, routes, middleware, commands)
//!     → application.rs (router + lifespan, serve with graceful shutdown)
//!     → context.rs (router state handed to every handler)
//! ```

mod application;
mod builder;
mod context;

pub use application::{Application, ServeError};
pub use builder::{build_app, AppBuilder, BuildError};
pub use context::AppContext;
