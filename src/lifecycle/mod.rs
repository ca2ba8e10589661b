//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (lifespan.rs):
//!     for each extension in order:
//!         setup → register services → contribute state
//!     → merge state (state.rs) → publish to handlers
//!
//! Shutdown (lifespan.rs):
//!     for each started extension in reverse:
//!         teardown (best-effort)
//!     → registry close hooks → clear published state
//!
//! Signals (signals.rs, shutdown.rs):
//!     SIGTERM/SIGINT or Shutdown::trigger → graceful server stop → teardown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: extensions start one at a time, never concurrently
//! - Ordered shutdown: exact reverse of the startup order
//! - Every setup and teardown has a deadline

pub mod extension;
pub mod lifespan;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use extension::{Extension, LifecycleContext};
pub use lifespan::{Lifespan, LifespanError, LifespanGuard, ShutdownReport, TeardownFailure, TeardownTimeout};
pub use shutdown::Shutdown;
pub use state::{ExtensionState, LifespanState, StateError};
