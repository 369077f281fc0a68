//! Registry for looking up dialects by name.

use std::sync::Arc;

use indexmap::IndexMap;

use super::definition::Dialect;
use super::vendors;
use crate::error::ConfigError;

/// Registry of dialects, keyed by name in registration order.
#[derive(Debug, Default)]
pub struct DialectRegistry {
    dialects: IndexMap<String, Arc<Dialect>>,
}

impl DialectRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            dialects: IndexMap::new(),
        }
    }

    /// Create a registry holding the built-in dialects.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.dialects.insert(
            vendors::routeros::DIALECT_NAME.to_string(),
            Arc::new(vendors::routeros::dialect()),
        );
        registry
    }

    /// Register a dialect, replacing any existing one with the same name.
    pub fn register(&mut self, dialect: Dialect) -> Result<(), ConfigError> {
        if dialect.name.is_empty() {
            return Err(ConfigError::Invalid {
                message: "dialect name must not be empty".to_string(),
            });
        }
        dialect.validate()?;
        self.dialects.insert(dialect.name.clone(), Arc::new(dialect));
        Ok(())
    }

    /// Get a dialect by name.
    pub fn get(&self, name: &str) -> Option<Arc<Dialect>> {
        self.dialects.get(name).cloned()
    }

    /// List registered dialect names.
    pub fn names(&self) -> Vec<&str> {
        self.dialects.keys().map(|s| s.as_str()).collect()
    }
}
