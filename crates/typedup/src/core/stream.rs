//! Stream, column, and table identity types.
//!
//! These are plain immutable values built once per sync cycle. SQL generators
//! read them; nothing mutates them after construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::identifier::{fit_identifier, NamingTransform};
use super::traits::Dialect;
use super::types::AbstractType;
use crate::error::{Result, TypedupError};

/// Row id column, present in both raw and final tables.
pub const COL_RAW_ID: &str = "_airbyte_raw_id";
/// Extraction timestamp column, present in both raw and final tables.
pub const COL_EXTRACTED_AT: &str = "_airbyte_extracted_at";
/// Per-row metadata column of the final table.
pub const COL_META: &str = "_airbyte_meta";
/// Raw table column holding the untyped record.
pub const COL_DATA: &str = "_airbyte_data";
/// Raw table column set once a record has been typed into the final table.
pub const COL_LOADED_AT: &str = "_airbyte_loaded_at";

/// Final-table metadata columns, in the order they lead every final table.
pub const FINAL_TABLE_META_COLUMNS: [&str; 3] = [COL_RAW_ID, COL_EXTRACTED_AT, COL_META];

/// Suffix of the shadow table a soft reset rebuilds into.
pub const SOFT_RESET_SUFFIX: &str = "_ab_soft_reset";

/// Default suffix of the shadow table an overwrite sync builds into.
pub const OVERWRITE_SUFFIX: &str = "_ab_tmp";

/// Bytes every final table name leaves free for a shadow suffix.
pub const MAX_SHADOW_SUFFIX_LEN: usize = if SOFT_RESET_SUFFIX.len() > OVERWRITE_SUFFIX.len() {
    SOFT_RESET_SUFFIX.len()
} else {
    OVERWRITE_SUFFIX.len()
};

/// Separator between namespace and stream name in raw table names.
const RAW_TABLE_SEPARATOR: &str = "_raw__stream_";

/// A column as known to the source and to the destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnId {
    /// Destination column name (after the naming transform).
    pub name: String,
    /// Field name in the source record, used to extract raw values.
    pub original_name: String,
    /// Dialect-quoted destination name, ready to embed in SQL.
    pub quoted: String,
}

impl ColumnId {
    /// Build a column id, quoting `name` with the dialect.
    pub fn new<D: Dialect + ?Sized>(
        dialect: &D,
        original_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            quoted: dialect.quote_ident(&name),
            original_name: original_name.into(),
            name,
        }
    }
}

/// Identity of one logical stream across source, raw table, and final table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub final_namespace: String,
    pub final_name: String,
    pub raw_namespace: String,
    pub raw_name: String,
    pub original_namespace: String,
    pub original_name: String,
}

impl StreamId {
    /// Derive final and raw identifiers through the naming transform.
    ///
    /// The raw table lives in `raw_namespace` under
    /// `{namespace}_raw__stream_{name}`. If the result would still equal the
    /// final identifier, `_raw` is appended so the two never collide.
    ///
    /// Every name fits in `max_len` bytes, and the final name leaves
    /// [`MAX_SHADOW_SUFFIX_LEN`] bytes free so its shadow tables stay
    /// distinct from it. Longer names are shortened with [`fit_identifier`].
    pub fn build(
        naming: &dyn NamingTransform,
        namespace: &str,
        name: &str,
        raw_namespace: &str,
        max_len: usize,
    ) -> Self {
        let final_namespace = fit_identifier(&naming.namespace(namespace), max_len);
        let final_name = fit_identifier(
            &naming.stream_name(name),
            max_len.saturating_sub(MAX_SHADOW_SUFFIX_LEN),
        );
        let raw_namespace = fit_identifier(&naming.namespace(raw_namespace), max_len);
        let mut raw_name = fit_identifier(
            &naming.stream_name(&format!("{}{}{}", namespace, RAW_TABLE_SEPARATOR, name)),
            max_len,
        );
        if raw_namespace == final_namespace && raw_name == final_name {
            raw_name = fit_identifier(&format!("{}_raw", raw_name), max_len);
        }

        Self {
            final_namespace,
            final_name,
            raw_namespace,
            raw_name,
            original_namespace: namespace.to_string(),
            original_name: name.to_string(),
        }
    }

    /// Quoted, schema-qualified final table name with an optional suffix.
    pub fn final_table_id<D: Dialect + ?Sized>(&self, dialect: &D, suffix: &str) -> String {
        format!(
            "{}.{}",
            dialect.quote_ident(&self.final_namespace),
            dialect.quote_ident(&format!("{}{}", self.final_name, suffix))
        )
    }

    /// Quoted, schema-qualified raw table name.
    pub fn raw_table_id<D: Dialect + ?Sized>(&self, dialect: &D) -> String {
        format!(
            "{}.{}",
            dialect.quote_ident(&self.raw_namespace),
            dialect.quote_ident(&self.raw_name)
        )
    }

    /// Unquoted `namespace.name` of the final table, for logs and errors.
    pub fn final_display(&self) -> String {
        format!("{}.{}", self.final_namespace, self.final_name)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.original_namespace, self.original_name)
    }
}

/// How records of a stream reach the final table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Every record is typed and appended; no deduplication.
    Append,
    /// One row per primary key, the newest non-deleted record.
    #[default]
    AppendDedup,
    /// Full refresh: the final table is rebuilt and swapped in each sync.
    Overwrite,
}

/// Immutable per-sync configuration of one stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub id: StreamId,
    pub sync_mode: SyncMode,
    /// Primary key columns, in composite-key order.
    pub primary_key: Vec<ColumnId>,
    /// Column used to rank records; newest wins.
    pub cursor: Option<ColumnId>,
    /// Expected final-table columns, excluding metadata columns, in source order.
    pub columns: Vec<(ColumnId, AbstractType)>,
}

impl StreamConfig {
    /// Check the invariants SQL generation relies on.
    pub fn validate(&self) -> Result<()> {
        let stream = self.id.to_string();
        if self.sync_mode == SyncMode::AppendDedup && self.primary_key.is_empty() {
            return Err(TypedupError::invalid_stream(
                stream,
                "append_dedup requires a non-empty primary key",
            ));
        }
        for pk in &self.primary_key {
            if self.column_type(pk).is_none() {
                return Err(TypedupError::invalid_stream(
                    stream,
                    format!("primary key column {} is not a stream column", pk.name),
                ));
            }
        }
        if let Some(cursor) = &self.cursor {
            if self.column_type(cursor).is_none() {
                return Err(TypedupError::invalid_stream(
                    stream,
                    format!("cursor column {} is not a stream column", cursor.name),
                ));
            }
        }
        for (column, _) in &self.columns {
            if FINAL_TABLE_META_COLUMNS.contains(&column.name.as_str()) {
                return Err(TypedupError::invalid_stream(
                    stream,
                    format!("column {} collides with a metadata column", column.name),
                ));
            }
        }
        Ok(())
    }

    /// Type of a stream column, if present.
    pub fn column_type(&self, column: &ColumnId) -> Option<&AbstractType> {
        self.columns
            .iter()
            .find(|(c, _)| c.name == column.name)
            .map(|(_, ty)| ty)
    }
}

/// Snapshot of an existing table as introspected from the destination.
///
/// Maps column name to the dialect type name reported by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExistingTableSchema {
    pub columns: BTreeMap<String, String>,
}

impl ExistingTableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with_column(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.columns.insert(name.into(), data_type.into());
        self
    }

    /// Look up a column type, falling back to a case-insensitive match.
    pub fn column_type(&self, name: &str) -> Option<&str> {
        self.columns
            .get(name)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

/// Ordered statements for one logical operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedSql {
    pub statements: Vec<String>,
    /// Whether the sequence contains an explicit transaction block.
    ///
    /// A combined sequence can also hold statements outside that block: a
    /// soft reset creates its shadow table in autocommit mode before the
    /// transactional merge and swap.
    pub transactional: bool,
}

impl GeneratedSql {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    /// Append another operation's statements after this one's.
    ///
    /// The result is transactional if either part contains a transaction block.
    pub fn extend(&mut self, other: GeneratedSql) {
        self.transactional |= other.transactional;
        self.statements.extend(other.statements);
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Render as a script, one `;`-terminated statement per block.
    pub fn to_script(&self) -> String {
        self.statements
            .iter()
            .map(|s| format!("{};\n", s.trim_end().trim_end_matches(';')))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for GeneratedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_script())
    }
}
