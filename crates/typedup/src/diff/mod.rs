//! Schema diff evaluation.
//!
//! [`matches`] is the pure decision: does an introspected table hold every
//! column the stream expects, with a type a previous run could have produced?
//! [`evaluate_existing`] adds the impure half, fetching the table through a
//! [`SchemaIntrospector`].

use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

use crate::core::stream::{ExistingTableSchema, StreamConfig, FINAL_TABLE_META_COLUMNS};
use crate::core::traits::SchemaIntrospector;
use crate::dialect::{acceptable_types, type_name_matches, SupportedTypes, TypeTable};
use crate::error::{Result, TypedupError};
use crate::generator::SqlGenerator;

/// Outcome of comparing a stream against an existing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reasons", rename_all = "snake_case")]
pub enum SchemaVerdict {
    Compatible,
    /// Human-readable reasons, one per offending column.
    Incompatible(Vec<String>),
}

impl SchemaVerdict {
    pub fn is_compatible(&self) -> bool {
        matches!(self, SchemaVerdict::Compatible)
    }
}

impl fmt::Display for SchemaVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVerdict::Compatible => write!(f, "compatible"),
            SchemaVerdict::Incompatible(reasons) => {
                write!(f, "incompatible: {}", reasons.join("; "))
            }
        }
    }
}

/// Compare `stream` against an existing table.
///
/// Extra columns are tolerated unless `strict`.
///
/// # Errors
///
/// [`TypedupError::TableNotMigrated`] when the table lacks a metadata column.
pub fn matches(
    stream: &StreamConfig,
    existing: &ExistingTableSchema,
    table: &TypeTable,
    supported: &SupportedTypes,
    strict: bool,
) -> Result<SchemaVerdict> {
    if let Some(missing) = FINAL_TABLE_META_COLUMNS
        .iter()
        .find(|c| existing.column_type(c).is_none())
    {
        debug!(stream = %stream.id, column = missing, "metadata column missing");
        return Err(TypedupError::TableNotMigrated(stream.id.final_display()));
    }

    let mut reasons = Vec::new();
    for (column, ty) in &stream.columns {
        let Some(actual) = existing.column_type(&column.name) else {
            reasons.push(format!("column {} is missing", column.name));
            continue;
        };
        let acceptable = acceptable_types(ty, table, supported);
        if !type_name_matches(actual, &acceptable) {
            reasons.push(format!(
                "column {} has type {}, expected one of [{}] for {}",
                column.name,
                actual,
                acceptable.iter().cloned().collect::<Vec<_>>().join(", "),
                ty
            ));
        }
    }

    if strict {
        for name in existing.columns.keys() {
            let expected = FINAL_TABLE_META_COLUMNS
                .iter()
                .any(|c| c.eq_ignore_ascii_case(name))
                || stream
                    .columns
                    .iter()
                    .any(|(c, _)| c.name.eq_ignore_ascii_case(name));
            if !expected {
                reasons.push(format!("column {} is not in the stream schema", name));
            }
        }
    }

    if reasons.is_empty() {
        Ok(SchemaVerdict::Compatible)
    } else {
        Ok(SchemaVerdict::Incompatible(reasons))
    }
}

/// Describe the final table of `stream`.
///
/// Every failure is reported as [`TypedupError::Introspection`].
pub async fn introspect(
    introspector: &dyn SchemaIntrospector,
    stream: &StreamConfig,
) -> Result<Option<ExistingTableSchema>> {
    introspector
        .describe_table(&stream.id.final_namespace, &stream.id.final_name)
        .await
        .map_err(|e| match e {
            TypedupError::Introspection { .. } => e,
            other => TypedupError::introspection(stream.id.final_display(), other.to_string()),
        })
}

/// Introspect the final table of `stream` and compare it.
///
/// Returns `None` when the table does not exist. Introspection failures are
/// reported as [`TypedupError::Introspection`] and never retried here.
pub async fn evaluate_existing(
    introspector: &dyn SchemaIntrospector,
    generator: &SqlGenerator,
    stream: &StreamConfig,
    strict: bool,
) -> Result<Option<SchemaVerdict>> {
    let table = stream.id.final_display();
    let Some(existing) = introspect(introspector, stream).await? else {
        info!(table = %table, "final table does not exist");
        return Ok(None);
    };
    let verdict = matches(
        stream,
        &existing,
        generator.type_table(),
        generator.supported_types(),
        strict,
    )?;
    info!(table = %table, %verdict, "evaluated existing table");
    Ok(Some(verdict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::StandardNaming;
    use crate::core::stream::{ColumnId, StreamId, SyncMode};
    use crate::core::traits::Dialect;
    use crate::core::types::AbstractType;
    use crate::drivers::DialectImpl;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn generator() -> SqlGenerator {
        SqlGenerator::new(DialectImpl::from_db_type("postgres").unwrap(), "16")
    }

    fn amount_stream(dialect: &DialectImpl) -> StreamConfig {
        let col = |name: &str| ColumnId::new(dialect, name, name);
        StreamConfig {
            id: StreamId::build(
                &StandardNaming,
                "public",
                "orders",
                "airbyte_internal",
                dialect.max_identifier_length(),
            ),
            sync_mode: SyncMode::Append,
            primary_key: vec![],
            cursor: None,
            columns: vec![
                (col("id"), AbstractType::INTEGER),
                (col("amount"), AbstractType::NUMBER),
            ],
        }
    }

    fn table_with(amount_type: &str) -> ExistingTableSchema {
        ExistingTableSchema::new()
            .with_column("_airbyte_raw_id", "text")
            .with_column("_airbyte_extracted_at", "timestamp with time zone")
            .with_column("_airbyte_meta", "jsonb")
            .with_column("id", "bigint")
            .with_column("amount", amount_type)
    }

    fn check(existing: &ExistingTableSchema, strict: bool) -> Result<SchemaVerdict> {
        let g = generator();
        let stream = amount_stream(g.dialect());
        matches(&stream, existing, g.type_table(), g.supported_types(), strict)
    }

    #[test]
    fn test_decimal_is_compatible_with_number() {
        assert_eq!(check(&table_with("DECIMAL"), false).unwrap(), SchemaVerdict::Compatible);
        assert_eq!(
            check(&table_with("numeric(38,9)"), false).unwrap(),
            SchemaVerdict::Compatible
        );
    }

    #[test]
    fn test_varchar_is_incompatible_with_number() {
        let verdict = check(&table_with("VARCHAR"), false).unwrap();
        match verdict {
            SchemaVerdict::Incompatible(reasons) => {
                assert_eq!(reasons.len(), 1);
                assert!(reasons[0].starts_with("column amount has type VARCHAR"));
            }
            SchemaVerdict::Compatible => panic!("expected incompatible"),
        }
    }

    #[test]
    fn test_missing_column() {
        let mut existing = table_with("decimal");
        existing.columns.remove("amount");
        let verdict = check(&existing, false).unwrap();
        assert_eq!(
            verdict,
            SchemaVerdict::Incompatible(vec!["column amount is missing".to_string()])
        );
    }

    #[test]
    fn test_extra_columns_only_fail_in_strict_mode() {
        let existing = table_with("decimal").with_column("legacy", "text");
        assert!(check(&existing, false).unwrap().is_compatible());
        let verdict = check(&existing, true).unwrap();
        assert_eq!(
            verdict,
            SchemaVerdict::Incompatible(vec!["column legacy is not in the stream schema".to_string()])
        );
    }

    #[test]
    fn test_missing_metadata_is_not_migrated() {
        let mut existing = table_with("decimal");
        existing.columns.remove("_airbyte_meta");
        let err = check(&existing, false).unwrap_err();
        assert!(matches!(err, TypedupError::TableNotMigrated(ref t) if t == "public.orders"));
    }

    #[test]
    fn test_matches_is_idempotent() {
        let existing = table_with("VARCHAR");
        assert_eq!(check(&existing, true).unwrap(), check(&existing, true).unwrap());
    }

    #[test]
    fn test_verdict_json() {
        let json = serde_json::to_value(SchemaVerdict::Incompatible(vec!["x".into()])).unwrap();
        assert_eq!(json, serde_json::json!({"verdict": "incompatible", "reasons": ["x"]}));
        let json = serde_json::to_value(SchemaVerdict::Compatible).unwrap();
        assert_eq!(json, serde_json::json!({"verdict": "compatible"}));
    }

    struct StaticIntrospector(HashMap<String, ExistingTableSchema>);

    #[async_trait]
    impl SchemaIntrospector for StaticIntrospector {
        async fn describe_table(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<ExistingTableSchema>> {
            Ok(self.0.get(&format!("{}.{}", namespace, name)).cloned())
        }
    }

    struct FailingIntrospector;

    #[async_trait]
    impl SchemaIntrospector for FailingIntrospector {
        async fn describe_table(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> Result<Option<ExistingTableSchema>> {
            Err(TypedupError::Io(std::io::Error::other("connection reset")))
        }
    }

    #[tokio::test]
    async fn test_evaluate_existing() {
        let g = generator();
        let stream = amount_stream(g.dialect());

        let empty = StaticIntrospector(HashMap::new());
        assert_eq!(evaluate_existing(&empty, &g, &stream, false).await.unwrap(), None);

        let present = StaticIntrospector(HashMap::from([(
            "public.orders".to_string(),
            table_with("numeric"),
        )]));
        assert_eq!(
            evaluate_existing(&present, &g, &stream, false).await.unwrap(),
            Some(SchemaVerdict::Compatible)
        );
    }

    #[tokio::test]
    async fn test_introspection_failure_is_distinct() {
        let g = generator();
        let stream = amount_stream(g.dialect());
        let err = evaluate_existing(&FailingIntrospector, &g, &stream, false)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("public.orders"));
        assert_eq!(g.dialect().name(), "postgres");
    }
}
