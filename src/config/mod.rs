//! Settings management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → Cargo.toml [package.metadata.cuneus]
//!     → .env file
//!     → environment variables
//!     → explicit overrides
//!     → loader.rs (figment merge & extract)
//!     → validation.rs (semantic checks)
//!     → Settings (validated, immutable)
//!     → shared via Arc to every extension
//! ```
//!
//! # Design Decisions
//! - Settings are immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Unknown keys are kept so extensions can read their own settings

mod de;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{SettingsError, SettingsLoader, DEFAULT_TOOL_NAME};
pub use schema::Settings;
pub use validation::{validate_settings, ValidationError};
