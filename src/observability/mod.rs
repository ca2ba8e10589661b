//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (subscriber setup for structured events)
//!     → metrics.rs (request and extension lifecycle counters/histograms)
//! ```
//!
//! # Design Decisions
//! - Events go through `tracing`; the request ID lives on the request span
//! - Metrics use the `metrics` facade; the host installs a recorder
//! - Logging setup never replaces a subscriber the host already installed

pub mod logging;
pub mod metrics;
