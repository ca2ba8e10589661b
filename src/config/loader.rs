//! Layered settings loading.
//!
//! Sources, lowest priority first:
//! defaults → project `Cargo.toml` metadata → dotfile → environment → overrides.
//!
//! Each source is a figment provider; `Figment::extract` does the merge and
//! reports the key path of any value that does not fit its field.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::schema::Settings;
use crate::config::validation::{validate_settings, ValidationError};

/// Tool table looked up under `[package.metadata.<tool>]`.
pub const DEFAULT_TOOL_NAME: &str = "cuneus";

/// Error type for settings loading.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{}:{line}: {message}", path.display())]
    Dotenv {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid value for '{key}': {message}")]
    Deserialize { key: String, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Extension '{extension}' requires setting '{key}'. Add '{key}' to your settings.")]
    MissingSetting { extension: String, key: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builder for a layered settings load.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    project_dir: Option<PathBuf>,
    tool_name: String,
    project_depth: usize,
    env_file: PathBuf,
    env_prefix: String,
    env: Option<HashMap<String, String>>,
    overrides: Map<String, Value>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            project_dir: None,
            tool_name: DEFAULT_TOOL_NAME.to_string(),
            project_depth: 2,
            env_file: PathBuf::from(".env"),
            env_prefix: String::new(),
            env: None,
            overrides: Map::new(),
        }
    }

    /// Directory to start the project config search from (default: cwd).
    pub fn project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    /// Name of the `[package.metadata.<tool>]` table.
    pub fn tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }

    /// How many directories (starting with the project dir) to search.
    pub fn project_depth(mut self, depth: usize) -> Self {
        self.project_depth = depth;
        self
    }

    /// Dotfile path; relative paths resolve against the project dir.
    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = path.into();
        self
    }

    /// Prefix for environment variable names (e.g. `MYAPP_`).
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Replace the process environment with an explicit variable set.
    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Set a value that wins over every other source.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Load, merge and validate settings.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        let base_dir = match &self.project_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|source| SettingsError::Io {
                path: PathBuf::from("."),
                source,
            })?,
        };

        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));

        if let Some(table) = find_project_table(&base_dir, &self.tool_name, self.project_depth)? {
            tracing::debug!(tool = %self.tool_name, keys = table.len(), "Project settings loaded");
            figment = figment.merge(Serialized::defaults(table));
        }

        let env_path = if self.env_file.is_absolute() {
            self.env_file.clone()
        } else {
            base_dir.join(&self.env_file)
        };
        if env_path.is_file() {
            let content = fs::read_to_string(&env_path).map_err(|source| SettingsError::Io {
                path: env_path.clone(),
                source,
            })?;
            let pairs: Map<String, Value> = parse_dotenv(&content, &env_path)?
                .into_iter()
                .map(|(key, raw)| (key.to_ascii_lowercase(), Value::String(raw)))
                .collect();
            tracing::debug!(path = %env_path.display(), keys = pairs.len(), "Dotfile settings loaded");
            figment = figment.merge(Serialized::defaults(pairs));
        }

        figment = match &self.env {
            Some(vars) => figment.merge(Serialized::defaults(self.declared_vars(vars))),
            None => figment.merge(Env::prefixed(&self.env_prefix).only(&Settings::FIELDS)),
        };

        figment = figment.merge(Serialized::globals(self.overrides.clone()));

        let settings: Settings = figment.extract().map_err(extract_error)?;

        validate_settings(&settings).map_err(SettingsError::Validation)?;

        Ok(settings)
    }

    /// Declared fields present in an injected variable set.
    fn declared_vars(&self, vars: &HashMap<String, String>) -> Map<String, Value> {
        Settings::FIELDS
            .iter()
            .filter_map(|field| {
                let var = format!("{}{}", self.env_prefix, field).to_ascii_uppercase();
                vars.get(&var)
                    .map(|raw| (field.to_string(), Value::String(raw.clone())))
            })
            .collect()
    }
}

fn extract_error(error: figment::Error) -> SettingsError {
    let key = if error.path.is_empty() {
        "settings".to_string()
    } else {
        error.path.join(".")
    };
    SettingsError::Deserialize {
        key,
        message: error.kind.to_string(),
    }
}

/// Find the first `Cargo.toml` at or above `start` and return its tool table.
fn find_project_table(start: &Path, tool: &str, depth: usize) -> Result<Option<toml::Table>, SettingsError> {
    for dir in start.ancestors().take(depth) {
        let manifest = dir.join("Cargo.toml");
        if !manifest.is_file() {
            continue;
        }

        let content = fs::read_to_string(&manifest).map_err(|source| SettingsError::Io {
            path: manifest.clone(),
            source,
        })?;
        let doc: toml::Table = content.parse().map_err(|source| SettingsError::Parse {
            path: manifest.clone(),
            source,
        })?;

        let table = ["package", "workspace"].iter().find_map(|section| {
            doc.get(*section)
                .and_then(|s| s.get("metadata"))
                .and_then(|m| m.get(tool))
                .and_then(|t| t.as_table())
        });
        return Ok(table.cloned());
    }
    Ok(None)
}

/// Parse `KEY=VALUE` lines from a dotfile.
pub(crate) fn parse_dotenv(content: &str, path: &Path) -> Result<Vec<(String, String)>, SettingsError> {
    let mut entries = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            return Err(SettingsError::Dotenv {
                path: path.to_path_buf(),
                line: idx + 1,
                message: "expected KEY=VALUE".to_string(),
            });
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(SettingsError::Dotenv {
                path: path.to_path_buf(),
                line: idx + 1,
                message: "empty key".to_string(),
            });
        }

        entries.push((key.to_string(), unquote(value.trim())));
    }

    Ok(entries)
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}
