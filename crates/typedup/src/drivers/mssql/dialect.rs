//! MSSQL SQL dialect (Strategy pattern).
//!
//! Raw records are stored as JSON text in an `nvarchar(max)` column. Fields
//! are read through `OPENJSON`, whose `value` column is `nvarchar(max)`
//! (`JSON_VALUE` yields NULL past 4000 characters). `TRY_CAST` yields NULL
//! for values that do not fit the target type.

use serde_json::Value;
use tracing::debug;

use crate::core::identifier::{escape_literal, quote_mssql};
use crate::core::stream::COL_DATA;
use crate::core::traits::{CastCheck, Dialect, TypeCatalog};
use crate::dialect::{DialectKind, DialectType, SupportedTypes, TypeEntry, TypeTable};

// OPENJSON `type` codes.
const JSON_NULL: u8 = 0;
const JSON_ARRAY: u8 = 4;
const JSON_OBJECT: u8 = 5;
/// Strings, numbers, and booleans.
const JSON_SCALARS: &str = "IN (1, 2, 3)";

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// Top-level member `field` of the raw record whose OPENJSON type code
    /// satisfies `type_filter`.
    fn member(&self, select: &str, field: &str, type_filter: &str) -> String {
        format!(
            "SELECT {} FROM OPENJSON({}) WHERE [key] = N'{}' AND [type] {}",
            select,
            quote_mssql(COL_DATA),
            escape_literal(field),
            type_filter
        )
    }

    /// Text of `field` as a scalar subquery; objects and arrays as JSON text.
    fn member_value(&self, field: &str, type_filter: &str) -> String {
        format!("({})", self.member("[value]", field, type_filter))
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mssql(name)
    }

    fn max_identifier_length(&self) -> usize {
        128
    }

    fn default_type_table(&self) -> TypeTable {
        TypeTable {
            text: TypeEntry::new("nvarchar(max)", &["nvarchar", "varchar", "ntext"]),
            decimal: TypeEntry::new("decimal(38,9)", &["decimal", "numeric"]),
            bigint: TypeEntry::new("bigint", &[]),
            boolean: TypeEntry::new("bit", &[]),
            timestamp_tz: TypeEntry::new("datetimeoffset", &[]),
            timestamp: TypeEntry::new("datetime2", &["datetime"]),
            time_tz: TypeEntry::new("nvarchar(max)", &["nvarchar"]),
            time: TypeEntry::new("time", &[]),
            date: TypeEntry::new("date", &[]),
            struct_type: TypeEntry::new("nvarchar(max)", &["nvarchar"]),
            array_type: TypeEntry::new("nvarchar(max)", &["nvarchar"]),
            serialized: TypeEntry::new("nvarchar(max)", &["nvarchar", "ntext"]),
        }
    }

    fn begin_transaction(&self) -> String {
        "BEGIN TRANSACTION".to_string()
    }

    fn commit_transaction(&self) -> String {
        "COMMIT TRANSACTION".to_string()
    }

    fn create_schema_if_not_exists(&self, schema: &str) -> String {
        format!(
            "IF SCHEMA_ID(N'{}') IS NULL EXEC(N'CREATE SCHEMA {}')",
            escape_literal(schema),
            escape_literal(&quote_mssql(schema))
        )
    }

    fn drop_table_if_exists(&self, table_id: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", table_id)
    }

    fn rename_table(&self, schema: &str, from: &str, to: &str) -> String {
        let source = format!("{}.{}", quote_mssql(schema), quote_mssql(from));
        format!(
            "EXEC sp_rename N'{}', N'{}'",
            escape_literal(&source),
            escape_literal(to)
        )
    }

    fn current_timestamp(&self) -> &str {
        "SYSDATETIMEOFFSET()"
    }

    fn field_present(&self, field: &str) -> String {
        format!("EXISTS ({})", self.member("1", field, &format!("<> {}", JSON_NULL)))
    }

    fn safe_cast(&self, field: &str, target: &DialectType) -> String {
        match target.kind {
            DialectKind::Text | DialectKind::Serialized => {
                self.member_value(field, &format!("<> {}", JSON_NULL))
            }
            DialectKind::Struct => self.member_value(field, &format!("= {}", JSON_OBJECT)),
            DialectKind::Array => self.member_value(field, &format!("= {}", JSON_ARRAY)),
            DialectKind::Decimal
            | DialectKind::BigInt
            | DialectKind::Boolean
            | DialectKind::TimestampTz
            | DialectKind::Timestamp
            | DialectKind::TimeTz
            | DialectKind::Time
            | DialectKind::Date => format!(
                "TRY_CAST({} AS {})",
                self.member_value(field, JSON_SCALARS),
                target.name
            ),
        }
    }

    fn deletion_flag(&self, field: &str) -> String {
        format!("CASE WHEN {} THEN 1 ELSE 0 END", self.field_present(field))
    }

    fn build_meta(&self, checks: &[CastCheck]) -> String {
        if checks.is_empty() {
            return "N'{\"errors\":[]}'".to_string();
        }
        let entries = checks
            .iter()
            .map(|check| {
                let entry = format!(
                    "{{\"field\":{},\"reason\":{}}}",
                    Value::String(check.column.clone()),
                    Value::String(check.reason.clone())
                );
                format!(
                    "CASE WHEN {} THEN N'{}' END",
                    check.failed,
                    escape_literal(&entry)
                )
            })
            .collect::<Vec<_>>()
            .join(",\n      ");
        // CONCAT_WS skips NULL arguments; the leading NULL keeps it valid
        // for a single check.
        format!(
            "CONCAT(N'{{\"errors\":[', CONCAT_WS(N',', NULL,\n      {}\n    ), N']}}')",
            entries
        )
    }

    fn order_desc_nulls_last(&self, expr: &str) -> String {
        format!("CASE WHEN {} IS NULL THEN 1 ELSE 0 END, {} DESC", expr, expr)
    }

    fn null_safe_eq(&self, left: &str, right: &str) -> String {
        format!(
            "({} = {} OR ({} IS NULL AND {} IS NULL))",
            left, right, left, right
        )
    }

    fn create_temp_table_as(&self, name: &str, query: &str) -> String {
        format!(
            "SELECT * INTO {} FROM (\n{}\n) AS {}",
            self.temp_table_ref(name),
            query,
            quote_mssql("src")
        )
    }

    fn temp_table_ref(&self, name: &str) -> String {
        quote_mssql(&format!("#{}", name))
    }

    fn drop_temp_table(&self, name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.temp_table_ref(name))
    }

    fn delete_matching(
        &self,
        table: &str,
        alias: &str,
        source: &str,
        source_alias: &str,
        condition: &str,
    ) -> String {
        format!(
            "DELETE {} FROM {} AS {} WHERE EXISTS (\n  SELECT 1 FROM {} AS {}\n  WHERE {}\n)",
            alias, table, alias, source, source_alias, condition
        )
    }
}

impl TypeCatalog for MssqlDialect {
    fn supported_types(&self, destination_version: &str) -> SupportedTypes {
        debug!(
            version = destination_version,
            "mssql has no native struct, array or zoned time types"
        );
        SupportedTypes::all()
            .without(DialectKind::Struct)
            .without(DialectKind::Array)
            .without(DialectKind::TimeTz)
    }
}
