//! Per-stream control flow around the SQL generator.
//!
//! A sync cycle for one stream is:
//!
//! 1. [`TyperDeduper::prepare_stream`]: create the final table, keep it, or
//!    soft reset it when its schema no longer matches
//! 2. [`TyperDeduper::typing_and_deduping`]: merge newly loaded raw records
//! 3. [`TyperDeduper::commit_final_table`]: swap in the shadow table of an
//!    overwrite stream
//!
//! The planner only produces SQL; executing it is the caller's job.

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::core::stream::{ExistingTableSchema, GeneratedSql, StreamConfig, SyncMode};
use crate::core::traits::SchemaIntrospector;
use crate::diff::{introspect, matches, SchemaVerdict};
use crate::error::Result;
use crate::generator::{SqlGenerator, OVERWRITE_SUFFIX};

/// What preparing a stream does to its final table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    /// The final table is missing and gets created.
    Create,
    /// The final table matches the stream; nothing to do.
    Keep,
    /// The final table no longer matches and is rebuilt from raw records.
    SoftReset { reasons: Vec<String> },
    /// Overwrite stream: a fresh shadow table is created for this sync.
    BuildShadow,
}

/// Prepared SQL for one stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamPlan {
    /// Final table, `namespace.name`.
    pub table: String,
    #[serde(flatten)]
    pub action: PlannedAction,
    pub sql: GeneratedSql,
}

/// Drives typing and deduping for a set of streams.
#[derive(Debug, Clone)]
pub struct TyperDeduper {
    generator: SqlGenerator,
    strict_columns: bool,
}

impl TyperDeduper {
    pub fn new(generator: SqlGenerator, strict_columns: bool) -> Self {
        Self {
            generator,
            strict_columns,
        }
    }

    /// Create a planner for the configured destination.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            SqlGenerator::from_config(config)?,
            config.destination.strict_columns,
        ))
    }

    pub fn generator(&self) -> &SqlGenerator {
        &self.generator
    }

    /// Plan the DDL that makes the final table ready for this sync.
    ///
    /// `existing` is the introspected final table, `None` when it is absent.
    pub fn prepare_stream(
        &self,
        stream: &StreamConfig,
        existing: Option<&ExistingTableSchema>,
    ) -> Result<StreamPlan> {
        let table = stream.id.final_display();

        let (action, sql) = if stream.sync_mode == SyncMode::Overwrite {
            (
                PlannedAction::BuildShadow,
                self.generator.create_table(stream, OVERWRITE_SUFFIX)?,
            )
        } else {
            match existing {
                None => (PlannedAction::Create, self.generator.create_table(stream, "")?),
                Some(existing) => match matches(
                    stream,
                    existing,
                    self.generator.type_table(),
                    self.generator.supported_types(),
                    self.strict_columns,
                )? {
                    SchemaVerdict::Compatible => (PlannedAction::Keep, GeneratedSql::new()),
                    SchemaVerdict::Incompatible(reasons) => (
                        PlannedAction::SoftReset { reasons },
                        self.generator.soft_reset(stream)?,
                    ),
                },
            }
        };

        info!(table = %table, action = ?action, statements = sql.len(), "prepared stream");
        Ok(StreamPlan { table, action, sql })
    }

    /// SQL typing this sync's raw records into the final (or shadow) table.
    pub fn typing_and_deduping(&self, stream: &StreamConfig) -> Result<GeneratedSql> {
        self.generator.update_table(stream, Self::target_suffix(stream))
    }

    /// SQL finishing the sync: the shadow swap for overwrite streams, nothing
    /// otherwise.
    pub fn commit_final_table(&self, stream: &StreamConfig) -> Result<GeneratedSql> {
        match stream.sync_mode {
            SyncMode::Overwrite => {
                info!(table = %stream.id.final_display(), "swapping in overwritten table");
                self.generator
                    .overwrite_final_table(&stream.id, OVERWRITE_SUFFIX)
            }
            SyncMode::Append | SyncMode::AppendDedup => Ok(GeneratedSql::new()),
        }
    }

    /// Introspect every stream's final table and prepare it.
    ///
    /// Stops at the first introspection failure; nothing is retried.
    pub async fn prepare_with(
        &self,
        introspector: &dyn SchemaIntrospector,
        streams: &[StreamConfig],
    ) -> Result<Vec<StreamPlan>> {
        let mut plans = Vec::with_capacity(streams.len());
        for stream in streams {
            let existing = if stream.sync_mode == SyncMode::Overwrite {
                None
            } else {
                introspect(introspector, stream).await?
            };
            plans.push(self.prepare_stream(stream, existing.as_ref())?);
        }
        Ok(plans)
    }

    fn target_suffix(stream: &StreamConfig) -> &'static str {
        match stream.sync_mode {
            SyncMode::Overwrite => OVERWRITE_SUFFIX,
            SyncMode::Append | SyncMode::AppendDedup => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::CatalogParser;
    use crate::error::TypedupError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    const YAML: &str = r#"
destination:
  dialect: postgres
  version: "16"
streams:
  - name: users
    primary_key: [id]
    cursor: updated_at
    json_schema:
      type: object
      properties:
        id: { type: integer }
        updated_at: { type: string, format: date-time }
        amount: { type: number }
  - name: snapshots
    sync_mode: overwrite
    json_schema:
      type: object
      properties:
        payload: { type: object }
"#;

    fn setup() -> (TyperDeduper, Vec<StreamConfig>) {
        let config = Config::from_yaml(YAML).unwrap();
        let streams = CatalogParser::from_config(&config)
            .unwrap()
            .parse_catalog(&config)
            .unwrap();
        (TyperDeduper::from_config(&config).unwrap(), streams)
    }

    fn users_table(amount_type: &str) -> ExistingTableSchema {
        ExistingTableSchema::new()
            .with_column("_airbyte_raw_id", "text")
            .with_column("_airbyte_extracted_at", "timestamptz")
            .with_column("_airbyte_meta", "jsonb")
            .with_column("id", "bigint")
            .with_column("updated_at", "timestamp with time zone")
            .with_column("amount", amount_type)
    }

    #[test]
    fn test_prepare_missing_table_creates_it() {
        let (planner, streams) = setup();
        let plan = planner.prepare_stream(&streams[0], None).unwrap();
        assert_eq!(plan.action, PlannedAction::Create);
        assert_eq!(plan.table, "public.users");
        assert!(plan.sql.statements[2].starts_with("CREATE TABLE \"public\".\"users\""));
    }

    #[test]
    fn test_prepare_compatible_table_is_kept() {
        let (planner, streams) = setup();
        let plan = planner
            .prepare_stream(&streams[0], Some(&users_table("numeric")))
            .unwrap();
        assert_eq!(plan.action, PlannedAction::Keep);
        assert!(plan.sql.is_empty());
    }

    #[test]
    fn test_prepare_incompatible_table_soft_resets() {
        let (planner, streams) = setup();
        let plan = planner
            .prepare_stream(&streams[0], Some(&users_table("varchar")))
            .unwrap();
        match &plan.action {
            PlannedAction::SoftReset { reasons } => assert!(reasons[0].contains("amount")),
            other => panic!("unexpected action {:?}", other),
        }
        assert!(plan.sql.to_script().contains("users_ab_soft_reset"));
    }

    #[test]
    fn test_soft_reset_round_trip_is_compatible() {
        let (planner, streams) = setup();
        let generator = planner.generator();
        // Columns of the table the soft reset creates, as introspection reports them.
        let create = generator
            .create_table(&streams[0], crate::generator::SOFT_RESET_SUFFIX)
            .unwrap();
        let ddl = &create.statements[2];
        let mut rebuilt = ExistingTableSchema::new();
        for line in ddl.lines().skip(1) {
            let line = line.trim().trim_end_matches(',').trim_end_matches(" NOT NULL");
            if let Some((name, ty)) = line.split_once(' ') {
                rebuilt = rebuilt.with_column(name.trim_matches('"'), ty);
            }
        }
        let plan = planner.prepare_stream(&streams[0], Some(&rebuilt)).unwrap();
        assert_eq!(plan.action, PlannedAction::Keep);
    }

    #[test]
    fn test_unmigrated_table_is_an_error() {
        let (planner, streams) = setup();
        let existing = ExistingTableSchema::new().with_column("id", "bigint");
        let err = planner.prepare_stream(&streams[0], Some(&existing)).unwrap_err();
        assert!(matches!(err, TypedupError::TableNotMigrated(_)));
    }

    #[test]
    fn test_overwrite_stream_flow() {
        let (planner, streams) = setup();
        let snapshots = &streams[1];

        let plan = planner.prepare_stream(snapshots, None).unwrap();
        assert_eq!(plan.action, PlannedAction::BuildShadow);
        assert!(plan.sql.statements[2].contains("\"snapshots_ab_tmp\""));

        let update = planner.typing_and_deduping(snapshots).unwrap().to_script();
        assert!(update.contains("INSERT INTO \"public\".\"snapshots_ab_tmp\""));

        let commit = planner.commit_final_table(snapshots).unwrap();
        assert!(commit
            .statements
            .contains(&"ALTER TABLE \"public\".\"snapshots_ab_tmp\" RENAME TO \"snapshots\"".to_string()));
        assert!(planner.commit_final_table(&streams[0]).unwrap().is_empty());
    }

    #[test]
    fn test_plan_json() {
        let (planner, streams) = setup();
        let plan = planner
            .prepare_stream(&streams[0], Some(&users_table("varchar")))
            .unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["action"], "soft_reset");
        assert_eq!(json["table"], "public.users");
        assert!(json["sql"]["transactional"].as_bool().unwrap());
    }

    struct Snapshot(HashMap<String, ExistingTableSchema>);

    #[async_trait]
    impl SchemaIntrospector for Snapshot {
        async fn describe_table(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<ExistingTableSchema>> {
            if name == "broken" {
                return Err(TypedupError::Config("permission denied".into()));
            }
            Ok(self.0.get(&format!("{}.{}", namespace, name)).cloned())
        }
    }

    #[tokio::test]
    async fn test_prepare_with_introspector() {
        let (planner, streams) = setup();
        let snapshot = Snapshot(HashMap::from([(
            "public.users".to_string(),
            users_table("decimal"),
        )]));
        let plans = planner.prepare_with(&snapshot, &streams).await.unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].action, PlannedAction::Keep);
        assert_eq!(plans[1].action, PlannedAction::BuildShadow);
    }

    #[tokio::test]
    async fn test_prepare_with_maps_failures() {
        let (planner, mut streams) = setup();
        streams[0].id.final_name = "broken".to_string();
        let err = planner
            .prepare_with(&Snapshot(HashMap::new()), &streams)
            .await
            .unwrap_err();
        assert!(matches!(err, TypedupError::Introspection { .. }));
        assert_eq!(err.exit_code(), 3);
    }
}
