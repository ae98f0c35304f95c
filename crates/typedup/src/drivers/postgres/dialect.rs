//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Raw records live in a `jsonb` column. Casts use `pg_input_is_valid`
//! (PostgreSQL 16+) so a malformed value yields NULL instead of aborting the
//! statement.

use tracing::debug;

use crate::core::identifier::{escape_literal, quote_pg};
use crate::core::stream::COL_DATA;
use crate::core::traits::{CastCheck, Dialect, TypeCatalog};
use crate::dialect::{DialectKind, DialectType, SupportedTypes, TypeEntry, TypeTable};

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// `jsonb` value of a raw field.
    fn json_value(&self, field: &str) -> String {
        format!("{}->'{}'", quote_pg(COL_DATA), escape_literal(field))
    }

    /// Text value of a raw field (JSON text for objects and arrays).
    fn text_value(&self, field: &str) -> String {
        format!("{}->>'{}'", quote_pg(COL_DATA), escape_literal(field))
    }

    fn json_type_is(&self, field: &str, json_type: &str) -> String {
        format!("jsonb_typeof({}) = '{}'", self.json_value(field), json_type)
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_pg(name)
    }

    /// NAMEDATALEN - 1; longer names are silently truncated.
    fn max_identifier_length(&self) -> usize {
        63
    }

    fn default_type_table(&self) -> TypeTable {
        TypeTable {
            text: TypeEntry::new("text", &["character varying", "varchar"]),
            decimal: TypeEntry::new("decimal", &["numeric"]),
            bigint: TypeEntry::new("bigint", &["int8"]),
            boolean: TypeEntry::new("boolean", &["bool"]),
            timestamp_tz: TypeEntry::new("timestamp with time zone", &["timestamptz"]),
            timestamp: TypeEntry::new("timestamp", &["timestamp without time zone"]),
            time_tz: TypeEntry::new("time with time zone", &["timetz"]),
            time: TypeEntry::new("time", &["time without time zone"]),
            date: TypeEntry::new("date", &[]),
            struct_type: TypeEntry::new("jsonb", &[]),
            array_type: TypeEntry::new("jsonb", &[]),
            serialized: TypeEntry::new("jsonb", &["json"]),
        }
    }

    fn begin_transaction(&self) -> String {
        "BEGIN".to_string()
    }

    fn commit_transaction(&self) -> String {
        "COMMIT".to_string()
    }

    fn create_schema_if_not_exists(&self, schema: &str) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", quote_pg(schema))
    }

    fn drop_table_if_exists(&self, table_id: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", table_id)
    }

    fn rename_table(&self, schema: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {}.{} RENAME TO {}",
            quote_pg(schema),
            quote_pg(from),
            quote_pg(to)
        )
    }

    fn current_timestamp(&self) -> &str {
        "now()"
    }

    fn field_present(&self, field: &str) -> String {
        format!(
            "COALESCE(jsonb_typeof({}), 'null') <> 'null'",
            self.json_value(field)
        )
    }

    fn safe_cast(&self, field: &str, target: &DialectType) -> String {
        match target.kind {
            DialectKind::Text => self.text_value(field),
            DialectKind::Struct => format!(
                "CASE WHEN {} THEN CAST({} AS {}) END",
                self.json_type_is(field, "object"),
                self.json_value(field),
                target.name
            ),
            DialectKind::Array => format!(
                "CASE WHEN {} THEN CAST({} AS {}) END",
                self.json_type_is(field, "array"),
                self.json_value(field),
                target.name
            ),
            DialectKind::Serialized => format!(
                "CASE WHEN {} THEN CAST({} AS {}) END",
                self.field_present(field),
                self.json_value(field),
                target.name
            ),
            DialectKind::Decimal
            | DialectKind::BigInt
            | DialectKind::Boolean
            | DialectKind::TimestampTz
            | DialectKind::Timestamp
            | DialectKind::TimeTz
            | DialectKind::Time
            | DialectKind::Date => {
                let text = self.text_value(field);
                format!(
                    "CASE WHEN pg_input_is_valid({}, '{}') THEN CAST({} AS {}) END",
                    text,
                    escape_literal(&target.name),
                    text,
                    target.name
                )
            }
        }
    }

    fn deletion_flag(&self, field: &str) -> String {
        format!("CASE WHEN {} THEN 1 ELSE 0 END", self.field_present(field))
    }

    fn build_meta(&self, checks: &[CastCheck]) -> String {
        if checks.is_empty() {
            return "jsonb_build_object('errors', '[]'::jsonb)".to_string();
        }
        let entries = checks
            .iter()
            .map(|check| {
                format!(
                    "CASE WHEN {} THEN jsonb_build_object('field', '{}', 'reason', '{}') END",
                    check.failed,
                    escape_literal(&check.column),
                    escape_literal(&check.reason)
                )
            })
            .collect::<Vec<_>>()
            .join(",\n      ");
        format!(
            "jsonb_build_object('errors', to_jsonb(array_remove(ARRAY[\n      {}\n    ]::jsonb[], NULL)))",
            entries
        )
    }

    fn order_desc_nulls_last(&self, expr: &str) -> String {
        format!("{} DESC NULLS LAST", expr)
    }

    fn null_safe_eq(&self, left: &str, right: &str) -> String {
        format!("{} IS NOT DISTINCT FROM {}", left, right)
    }

    fn create_temp_table_as(&self, name: &str, query: &str) -> String {
        format!("CREATE TEMPORARY TABLE {} AS\n{}", quote_pg(name), query)
    }

    /// Qualified with `pg_temp` so a permanent table of the same name on the
    /// search path is never touched.
    fn temp_table_ref(&self, name: &str) -> String {
        format!("pg_temp.{}", quote_pg(name))
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
            "DELETE FROM {} AS {} WHERE EXISTS (\n  SELECT 1 FROM {} AS {}\n  WHERE {}\n)",
            table, alias, source, source_alias, condition
        )
    }
}

impl TypeCatalog for PostgresDialect {
    fn supported_types(&self, destination_version: &str) -> SupportedTypes {
        debug!(version = destination_version, "postgres supports every dialect kind");
        SupportedTypes::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("name"), "\"name\"");
        assert_eq!(dialect.quote_ident("table\"name"), "\"table\"\"name\"");
    }

    #[test]
    fn test_safe_cast_integer() {
        let dialect = PostgresDialect::new();
        let target = dialect.default_type_table().dialect_type(DialectKind::BigInt);
        assert_eq!(
            dialect.safe_cast("age", &target),
            "CASE WHEN pg_input_is_valid(\"_airbyte_data\"->>'age', 'bigint') \
             THEN CAST(\"_airbyte_data\"->>'age' AS bigint) END"
        );
    }

    #[test]
    fn test_safe_cast_escapes_field_names() {
        let dialect = PostgresDialect::new();
        let target = dialect.default_type_table().dialect_type(DialectKind::Text);
        assert_eq!(
            dialect.safe_cast("o'brien", &target),
            "\"_airbyte_data\"->>'o''brien'"
        );
    }

    #[test]
    fn test_safe_cast_struct_checks_json_type() {
        let dialect = PostgresDialect::new();
        let target = dialect.default_type_table().dialect_type(DialectKind::Struct);
        let sql = dialect.safe_cast("address", &target);
        assert!(sql.contains("jsonb_typeof(\"_airbyte_data\"->'address') = 'object'"));
        assert!(sql.contains("CAST(\"_airbyte_data\"->'address' AS jsonb)"));
    }

    #[test]
    fn test_build_meta() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.build_meta(&[]),
            "jsonb_build_object('errors', '[]'::jsonb)"
        );
        let sql = dialect.build_meta(&[CastCheck {
            column: "age".to_string(),
            reason: "could not cast to bigint".to_string(),
            failed: "x IS NULL".to_string(),
        }]);
        assert!(sql.contains("array_remove"));
        assert!(sql.contains(
            "CASE WHEN x IS NULL THEN jsonb_build_object('field', 'age', 'reason', 'could not cast to bigint') END"
        ));
    }

    #[test]
    fn test_ordering_and_equality() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.order_desc_nulls_last("c"), "c DESC NULLS LAST");
        assert_eq!(dialect.null_safe_eq("a", "b"), "a IS NOT DISTINCT FROM b");
    }

    #[test]
    fn test_rename_table() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.rename_table("public", "users_tmp", "users"),
            "ALTER TABLE \"public\".\"users_tmp\" RENAME TO \"users\""
        );
    }

    #[test]
    fn test_temp_tables_live_in_pg_temp() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.temp_table_ref("_ab_typed"), "pg_temp.\"_ab_typed\"");
        assert_eq!(
            dialect.drop_temp_table("_ab_typed"),
            "DROP TABLE IF EXISTS pg_temp.\"_ab_typed\""
        );
        assert_eq!(
            dialect.create_temp_table_as("_ab_typed", "SELECT 1"),
            "CREATE TEMPORARY TABLE \"_ab_typed\" AS\nSELECT 1"
        );
    }

    #[test]
    fn test_supported_types() {
        let supported = PostgresDialect::new().supported_types("16");
        assert!(supported.contains(DialectKind::Struct));
        assert!(supported.contains(DialectKind::TimeTz));
    }
}
