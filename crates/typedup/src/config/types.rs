//! Configuration types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::core::stream::SyncMode;
use crate::dialect::{DialectKind, TypeEntry};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination configuration.
    pub destination: DestinationConfig,

    /// Deduplication behavior.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Streams to type and deduplicate.
    #[serde(default)]
    pub streams: Vec<StreamDefinition>,
}

/// Destination database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Dialect name (`postgres`, `mssql`, or an alias such as `pg`).
    #[serde(default = "default_postgres")]
    pub dialect: String,

    /// Destination server version, passed to the type catalog.
    #[serde(default)]
    pub version: String,

    /// Namespace for streams that do not name one (default: "public").
    #[serde(default = "default_public_schema")]
    pub default_namespace: String,

    /// Namespace holding raw tables (default: "airbyte_internal").
    #[serde(default = "default_raw_namespace")]
    pub raw_namespace: String,

    /// Treat columns absent from the stream schema as incompatible.
    #[serde(default)]
    pub strict_columns: bool,

    /// Per-kind replacements for the dialect's default type table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub type_overrides: BTreeMap<DialectKind, TypeEntry>,
}

/// Deduplication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Precedence of deletion markers when ranking records.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,

    /// Raw field whose non-null value marks a record as deleted.
    #[serde(default = "default_deletion_field")]
    pub deletion_field: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            deletion_policy: DeletionPolicy::default(),
            deletion_field: default_deletion_field(),
        }
    }
}

/// How deletion markers rank against updates for the same primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPolicy {
    /// The newest record wins; a deletion wins ties on the cursor.
    #[default]
    NewestWins,

    /// Any deletion wins over every update for its key.
    AlwaysWins,
}

/// One stream as declared in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDefinition {
    /// Source namespace; falls back to `destination.default_namespace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Source stream name.
    pub name: String,

    /// Sync mode (default: append_dedup).
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Primary key fields, in composite-key order.
    #[serde(default)]
    pub primary_key: Vec<String>,

    /// Cursor field used to rank records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,

    /// JSON schema of the stream's records.
    #[serde(default)]
    pub json_schema: Value,
}

impl StreamDefinition {
    /// Top-level properties of the JSON schema, if it declares any.
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.json_schema.get("properties").and_then(Value::as_object)
    }

    /// Whether the JSON schema declares a top-level field.
    pub fn has_field(&self, field: &str) -> bool {
        self.properties()
            .map(|props| props.contains_key(field))
            .unwrap_or(false)
    }
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_raw_namespace() -> String {
    "airbyte_internal".to_string()
}

fn default_deletion_field() -> String {
    "_ab_cdc_deleted_at".to_string()
}
