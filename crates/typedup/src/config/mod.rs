//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::core::traits::Dialect;
use crate::dialect::TypeTable;
use crate::drivers::DialectImpl;
use crate::error::{Result, TypedupError};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Source namespace of a stream, applying the default.
    pub fn namespace_of<'a>(&'a self, stream: &'a StreamDefinition) -> &'a str {
        stream
            .namespace
            .as_deref()
            .unwrap_or(&self.destination.default_namespace)
    }

    /// Find a stream by `namespace.name` (or just `name` in the default namespace).
    pub fn find_stream(&self, label: &str) -> Result<&StreamDefinition> {
        let (namespace, name) = label
            .split_once('.')
            .unwrap_or((self.destination.default_namespace.as_str(), label));
        self.streams
            .iter()
            .find(|s| self.namespace_of(s) == namespace && s.name == name)
            .ok_or_else(|| TypedupError::Config(format!("stream '{}' is not configured", label)))
    }

    /// The configured destination dialect.
    pub fn dialect(&self) -> Result<DialectImpl> {
        DialectImpl::from_db_type(&self.destination.dialect)
    }

    /// The dialect's default type table with configured overrides applied.
    pub fn type_table(&self, dialect: &DialectImpl) -> TypeTable {
        let mut table = dialect.default_type_table();
        for (kind, entry) in &self.destination.type_overrides {
            table.set(*kind, entry.clone());
        }
        table
    }
}
