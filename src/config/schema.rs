//! Settings schema definitions.
//!
//! This module defines the typed settings every extension receives.
//! All fields derive Serde traits so they can be layered from project
//! config, dotfiles, the environment and explicit overrides.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::de;
use crate::config::loader::SettingsError;

/// Application settings shared by the orchestrator and every extension.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Application name used in logs and CLI output.
    #[serde(deserialize_with = "de::text")]
    pub app_name: String,

    /// Debug mode (adds exception details to 500 responses).
    #[serde(deserialize_with = "de::flag")]
    pub debug: bool,

    /// Application version reported by health checks.
    #[serde(deserialize_with = "de::optional_text")]
    pub version: Option<String>,

    /// Default bind host for `serve`.
    #[serde(deserialize_with = "de::text")]
    pub host: String,

    /// Default bind port for `serve`.
    #[serde(deserialize_with = "de::number")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(deserialize_with = "de::text")]
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    #[serde(deserialize_with = "de::flag")]
    pub log_json: bool,

    /// Log 5xx application errors at error level.
    #[serde(deserialize_with = "de::flag")]
    pub log_server_errors: bool,

    /// Header carrying the request identifier.
    #[serde(deserialize_with = "de::text")]
    pub request_id_header: String,

    /// Mount the health endpoints.
    #[serde(deserialize_with = "de::flag")]
    pub health_enabled: bool,

    /// Path prefix for the health endpoints.
    #[serde(deserialize_with = "de::text")]
    pub health_prefix: String,

    /// Deadline for each extension setup, in seconds.
    #[serde(deserialize_with = "de::number")]
    pub startup_timeout_secs: u64,

    /// Deadline for each extension teardown, in seconds.
    #[serde(deserialize_with = "de::number")]
    pub shutdown_timeout_secs: u64,

    /// Keys not declared above, kept for user extensions.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "app".to_string(),
            debug: false,
            version: None,
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_json: false,
            log_server_errors: true,
            request_id_header: "X-Request-ID".to_string(),
            health_enabled: true,
            health_prefix: "/healthz".to_string(),
            startup_timeout_secs: 30,
            shutdown_timeout_secs: 10,
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Declared field names, the keys environment variables may set.
    pub const FIELDS: [&'static str; 13] = [
        "app_name",
        "debug",
        "version",
        "host",
        "port",
        "log_level",
        "log_json",
        "log_server_errors",
        "request_id_header",
        "health_enabled",
        "health_prefix",
        "startup_timeout_secs",
        "shutdown_timeout_secs",
    ];

    /// Load settings from the current directory and process environment.
    pub fn load() -> Result<Self, SettingsError> {
        crate::config::loader::SettingsLoader::new().load()
    }

    /// Look up an extra key and deserialize it.
    ///
    /// Returns `None` when the key is absent or does not fit `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Look up an extra key an extension cannot run without.
    pub fn require<T: DeserializeOwned>(&self, extension: &str, key: &str) -> Result<T, SettingsError> {
        let missing = || SettingsError::MissingSetting {
            extension: extension.to_string(),
            key: key.to_string(),
        };

        match self.extra.get(key) {
            None | Some(Value::Null) => Err(missing()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| SettingsError::Deserialize {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// The tracing level matching `log_level`.
    ///
    /// `warning` is accepted as an alias for `warn`.
    pub fn tracing_level(&self) -> Option<tracing::Level> {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => Some(tracing::Level::TRACE),
            "debug" => Some(tracing::Level::DEBUG),
            "info" => Some(tracing::Level::INFO),
            "warn" | "warning" => Some(tracing::Level::WARN),
            "error" => Some(tracing::Level::ERROR),
            _ => None,
        }
    }

    /// Socket address string for `serve`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
