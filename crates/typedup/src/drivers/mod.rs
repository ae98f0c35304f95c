//! Destination driver implementations.
//!
//! - [`mssql`]: Microsoft SQL Server dialect
//! - [`postgres`]: PostgreSQL dialect
//!
//! # Adding New Destinations
//!
//! 1. Create a new module under `drivers/` (e.g., `drivers/snowflake/`)
//! 2. Implement [`Dialect`] and [`TypeCatalog`] for it
//! 3. Add an enum variant to [`DialectImpl`] and an alias in
//!    [`DialectImpl::from_db_type`]

pub mod mssql;
pub mod postgres;

pub use mssql::MssqlDialect;
pub use postgres::PostgresDialect;

use crate::core::traits::{CastCheck, Dialect, TypeCatalog};
use crate::dialect::{DialectType, SupportedTypes, TypeTable};
use crate::error::{Result, TypedupError};

/// Enum-based static dispatch for dialects.
///
/// The compiler generates a match statement instead of vtable dispatch.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mssql(MssqlDialect),
    Postgres(PostgresDialect),
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $call:expr) => {
        match $self {
            DialectImpl::Mssql($d) => $call,
            DialectImpl::Postgres($d) => $call,
        }
    };
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        dispatch!(self, d => d.name())
    }

    fn quote_ident(&self, name: &str) -> String {
        dispatch!(self, d => d.quote_ident(name))
    }

    fn max_identifier_length(&self) -> usize {
        dispatch!(self, d => d.max_identifier_length())
    }

    fn default_type_table(&self) -> TypeTable {
        dispatch!(self, d => d.default_type_table())
    }

    fn begin_transaction(&self) -> String {
        dispatch!(self, d => d.begin_transaction())
    }

    fn commit_transaction(&self) -> String {
        dispatch!(self, d => d.commit_transaction())
    }

    fn create_schema_if_not_exists(&self, schema: &str) -> String {
        dispatch!(self, d => d.create_schema_if_not_exists(schema))
    }

    fn drop_table_if_exists(&self, table_id: &str) -> String {
        dispatch!(self, d => d.drop_table_if_exists(table_id))
    }

    fn rename_table(&self, schema: &str, from: &str, to: &str) -> String {
        dispatch!(self, d => d.rename_table(schema, from, to))
    }

    fn current_timestamp(&self) -> &str {
        dispatch!(self, d => d.current_timestamp())
    }

    fn field_present(&self, field: &str) -> String {
        dispatch!(self, d => d.field_present(field))
    }

    fn safe_cast(&self, field: &str, target: &DialectType) -> String {
        dispatch!(self, d => d.safe_cast(field, target))
    }

    fn deletion_flag(&self, field: &str) -> String {
        dispatch!(self, d => d.deletion_flag(field))
    }

    fn build_meta(&self, checks: &[CastCheck]) -> String {
        dispatch!(self, d => d.build_meta(checks))
    }

    fn order_desc_nulls_last(&self, expr: &str) -> String {
        dispatch!(self, d => d.order_desc_nulls_last(expr))
    }

    fn null_safe_eq(&self, left: &str, right: &str) -> String {
        dispatch!(self, d => d.null_safe_eq(left, right))
    }

    fn create_temp_table_as(&self, name: &str, query: &str) -> String {
        dispatch!(self, d => d.create_temp_table_as(name, query))
    }

    fn temp_table_ref(&self, name: &str) -> String {
        dispatch!(self, d => d.temp_table_ref(name))
    }

    fn drop_temp_table(&self, name: &str) -> String {
        dispatch!(self, d => d.drop_temp_table(name))
    }

    fn delete_matching(
        &self,
        table: &str,
        alias: &str,
        source: &str,
        source_alias: &str,
        condition: &str,
    ) -> String {
        dispatch!(self, d => d.delete_matching(table, alias, source, source_alias, condition))
    }
}

impl TypeCatalog for DialectImpl {
    fn supported_types(&self, destination_version: &str) -> SupportedTypes {
        dispatch!(self, d => d.supported_types(destination_version))
    }
}

impl DialectImpl {
    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "mssql" | "sqlserver" | "sql_server" => Ok(DialectImpl::Mssql(MssqlDialect::new())),
            "postgres" | "postgresql" | "pg" => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            other => Err(TypedupError::Config(format!(
                "Unknown database type: '{}'. Supported types: mssql, postgres",
                other
            ))),
        }
    }
}
