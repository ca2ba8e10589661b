//! Structured logging.
//!
//! # Responsibilities
//! - Install the global tracing subscriber from settings
//! - Choose JSON or human-readable output
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - Installing twice is not an error; the first subscriber stays

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Settings;

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(settings: &Settings) -> bool {
    let level = settings.tracing_level().unwrap_or(tracing::Level::INFO);
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if settings.log_json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    match installed {
        Ok(()) => {
            tracing::debug!(level = %level, json = settings.log_json, "Logging initialized");
            true
        }
        Err(_) => false,
    }
}
