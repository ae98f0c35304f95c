//! File-backed schema introspection.
//!
//! Stands in for a live destination: a JSON file maps `namespace.name` to the
//! table's `{column: type}` map. Tables absent from the file do not exist.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use typedup::{ExistingTableSchema, Result, SchemaIntrospector, TypedupError};

#[derive(Debug, Default)]
pub struct SnapshotIntrospector {
    tables: HashMap<String, ExistingTableSchema>,
}

impl SnapshotIntrospector {
    /// Load a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TypedupError::introspection(path.display().to_string(), e.to_string())
        })?;
        let tables: HashMap<String, ExistingTableSchema> = serde_json::from_str(&content)?;
        debug!(tables = tables.len(), "loaded destination snapshot");
        Ok(Self { tables })
    }

    pub fn with_table(mut self, table: &str, schema: ExistingTableSchema) -> Self {
        self.tables.insert(table.to_string(), schema);
        self
    }
}

#[async_trait]
impl SchemaIntrospector for SnapshotIntrospector {
    async fn describe_table(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ExistingTableSchema>> {
        Ok(self.tables.get(&format!("{}.{}", namespace, name)).cloned())
    }
}
