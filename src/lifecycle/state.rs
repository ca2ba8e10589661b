//! Lifespan state contributed by extensions.
//!
//! # Responsibilities
//! - Carry the typed values one extension hands back from setup
//! - Merge contributions into a single map, rejecting duplicate keys
//! - Give handlers typed, checked access by key

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::lifecycle::LifespanError;

type Value = Arc<dyn Any + Send + Sync>;

/// Errors from typed state access.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Lifespan state has no key '{key}'")]
    Missing { key: String },

    #[error("Lifespan state key '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

/// Values one extension contributes to the lifespan state.
#[derive(Clone, Default)]
pub struct ExtensionState {
    values: BTreeMap<String, Value>,
}

impl std::fmt::Debug for ExtensionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

impl ExtensionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<T: Send + Sync + 'static>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Insert a value that is already shared (e.g. also registered as a service).
    pub fn insert_shared<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: Arc<T>) {
        self.values.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Merged state of every started extension.
#[derive(Clone, Default)]
pub struct LifespanState {
    values: BTreeMap<String, Value>,
}

impl std::fmt::Debug for LifespanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

impl LifespanState {
    /// Typed lookup by key.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Result<Arc<T>, StateError> {
        let value = self.values.get(key).ok_or_else(|| StateError::Missing {
            key: key.to_string(),
        })?;
        value.clone().downcast::<T>().map_err(|_| StateError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<T>(),
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fold one extension's contribution in.
    ///
    /// On collision nothing is merged and every overlapping key is reported.
    pub(crate) fn merge(&mut self, extension: &str, contributed: ExtensionState) -> Result<(), LifespanError> {
        let overlap: Vec<String> = contributed
            .values
            .keys()
            .filter(|k| self.values.contains_key(*k))
            .cloned()
            .collect();

        if !overlap.is_empty() {
            return Err(LifespanError::StateCollision {
                extension: extension.to_string(),
                keys: overlap,
            });
        }

        self.values.extend(contributed.values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut state = LifespanState::default();
        state
            .merge("db", ExtensionState::new().with("db_url", "postgres://db".to_string()))
            .unwrap();

        assert_eq!(*state.get::<String>("db_url").unwrap(), "postgres://db");
        assert_eq!(
            state.get::<u32>("db_url").unwrap_err(),
            StateError::TypeMismatch {
                key: "db_url".into(),
                expected: "u32"
            }
        );
        assert_eq!(
            state.get::<String>("redis").unwrap_err(),
            StateError::Missing { key: "redis".into() }
        );
    }

    #[test]
    fn test_collision_reports_sorted_keys_and_merges_nothing() {
        let mut state = LifespanState::default();
        state
            .merge("first", ExtensionState::new().with("a", 1u8).with("b", 2u8))
            .unwrap();

        let err = state
            .merge(
                "second",
                ExtensionState::new().with("b", 3u8).with("c", 4u8).with("a", 5u8),
            )
            .unwrap_err();

        match err {
            LifespanError::StateCollision { extension, keys } => {
                assert_eq!(extension, "second");
                assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!state.contains_key("c"));
        assert_eq!(*state.get::<u8>("a").unwrap(), 1);
    }
}
