//! Core traits at the seams between SQL generation and its collaborators.
//!
//! - [`Dialect`]: SQL syntax strategy for a destination engine
//! - [`TypeCatalog`]: which dialect types a destination version supports
//! - [`SchemaIntrospector`]: reads the live schema of an existing table
//!
//! Generation is pure; only [`SchemaIntrospector`] touches a destination, and
//! the library never calls it except through [`crate::planner`].

use async_trait::async_trait;

use crate::dialect::{DialectType, SupportedTypes, TypeTable};
use crate::error::Result;

use super::stream::ExistingTableSchema;

/// A per-column cast failure check feeding the metadata column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastCheck {
    /// Destination column name reported in the error entry.
    pub column: String,
    /// Human-readable failure reason.
    pub reason: String,
    /// Boolean SQL condition, true when the cast failed.
    pub failed: String,
}

/// SQL syntax strategy for different destination engines.
///
/// Every method returns statement or expression text; nothing is executed.
/// Expressions over the raw record refer to the raw table's data column
/// unqualified, so they are valid inside a `SELECT ... FROM raw_table`.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "postgres", "mssql").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Longest identifier, in bytes, the destination keeps intact.
    ///
    /// Longer names are truncated (or rejected) by the server, so generated
    /// names must fit within it, shadow-table suffixes included.
    fn max_identifier_length(&self) -> usize;

    /// Default type table for this destination.
    fn default_type_table(&self) -> TypeTable;

    /// Statement opening a transaction.
    fn begin_transaction(&self) -> String;

    /// Statement committing a transaction.
    fn commit_transaction(&self) -> String;

    /// Create a schema unless it already exists.
    fn create_schema_if_not_exists(&self, schema: &str) -> String;

    /// Drop a table (qualified, quoted id) if it exists.
    fn drop_table_if_exists(&self, table_id: &str) -> String;

    /// Rename `schema.from` to `schema.to`, keeping the schema.
    fn rename_table(&self, schema: &str, from: &str, to: &str) -> String;

    /// Expression evaluating to the current timestamp.
    fn current_timestamp(&self) -> &str;

    /// Boolean condition: the raw record has a non-null value for `field`.
    fn field_present(&self, field: &str) -> String;

    /// Expression casting the raw value of `field` to `target`.
    ///
    /// Must evaluate to NULL instead of raising when the value cannot be
    /// represented in the target type.
    fn safe_cast(&self, field: &str, target: &DialectType) -> String;

    /// Expression evaluating to 1 when the record is a deletion marker, else 0.
    fn deletion_flag(&self, field: &str) -> String;

    /// Expression building the per-row metadata value from cast checks.
    fn build_meta(&self, checks: &[CastCheck]) -> String;

    /// ORDER BY item sorting `expr` descending with NULLs last.
    fn order_desc_nulls_last(&self, expr: &str) -> String;

    /// Equality that treats two NULLs as equal.
    fn null_safe_eq(&self, left: &str, right: &str) -> String;

    /// Create a session-local temporary table holding the rows of `query`.
    fn create_temp_table_as(&self, name: &str, query: &str) -> String;

    /// Reference to a temporary table created by [`Dialect::create_temp_table_as`].
    fn temp_table_ref(&self, name: &str) -> String;

    /// Drop a temporary table.
    fn drop_temp_table(&self, name: &str) -> String;

    /// Delete rows of `table` (aliased `alias`) for which a matching row
    /// exists in `source` (aliased `source_alias`) under `condition`.
    fn delete_matching(
        &self,
        table: &str,
        alias: &str,
        source: &str,
        source_alias: &str,
        condition: &str,
    ) -> String;
}

/// Answers which dialect types a destination version supports.
pub trait TypeCatalog: Send + Sync {
    fn supported_types(&self, destination_version: &str) -> SupportedTypes;
}

/// Reads the schema of an existing destination table.
///
/// Implementations own connections; failures surface as
/// [`TypedupError::Introspection`](crate::error::TypedupError::Introspection).
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Describe `namespace.name`, or `None` when the table does not exist.
    async fn describe_table(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ExistingTableSchema>>;
}
