//! Typed selection from the raw table and the deduplicating merge.
//!
//! Both paths stage the typed rows in a session temp table first, so the rows
//! marked loaded at the end are exactly the rows that were typed.

use crate::config::DeletionPolicy;
use crate::core::stream::{
    GeneratedSql, StreamConfig, COL_EXTRACTED_AT, COL_LOADED_AT, COL_META, COL_RAW_ID,
};
use crate::core::traits::{CastCheck, Dialect};
use crate::dialect::DialectKind;

use super::SqlGenerator;

/// Typed-rows staging table.
const TYPED_TABLE: &str = "_ab_typed";
/// Per-key winners staging table.
const WINNERS_TABLE: &str = "_ab_winners";
/// Staging column holding the 0/1 deletion flag.
const COL_IS_DELETED: &str = "_ab_is_deleted";
/// Staging column holding the per-key rank.
const COL_ROW_NUMBER: &str = "_ab_row_number";

/// One key of the per-primary-key ranking, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankTerm {
    /// Cursor value, NULLs last.
    Cursor,
    /// Deletion markers before updates.
    Deleted,
    /// Extraction timestamp.
    ExtractedAt,
}

impl RankTerm {
    /// Ranking order for a policy.
    pub fn order(policy: DeletionPolicy, has_cursor: bool) -> Vec<RankTerm> {
        match (policy, has_cursor) {
            (DeletionPolicy::NewestWins, true) => {
                vec![RankTerm::Cursor, RankTerm::Deleted, RankTerm::ExtractedAt]
            }
            (DeletionPolicy::NewestWins, false) => vec![RankTerm::ExtractedAt, RankTerm::Deleted],
            (DeletionPolicy::AlwaysWins, true) => {
                vec![RankTerm::Deleted, RankTerm::Cursor, RankTerm::ExtractedAt]
            }
            (DeletionPolicy::AlwaysWins, false) => vec![RankTerm::Deleted, RankTerm::ExtractedAt],
        }
    }
}

impl SqlGenerator {
    /// Deduplicating merge into `final_table + suffix`.
    ///
    /// With `all_records` every raw record is typed, not just unloaded ones.
    pub(super) fn merge_sql(
        &self,
        stream: &StreamConfig,
        suffix: &str,
        all_records: bool,
    ) -> GeneratedSql {
        let d = &self.dialect;
        let final_id = stream.id.final_table_id(d, suffix);
        let typed = d.temp_table_ref(TYPED_TABLE);
        let winners = d.temp_table_ref(WINNERS_TABLE);

        let mut sql = self.begin();
        sql.push(d.create_temp_table_as(
            TYPED_TABLE,
            &self.typed_select(stream, all_records, true),
        ));
        sql.push(d.create_temp_table_as(WINNERS_TABLE, &self.winners_select(stream, &typed)));

        let pk_match = stream
            .primary_key
            .iter()
            .map(|pk| d.null_safe_eq(&format!("f.{}", pk.quoted), &format!("w.{}", pk.quoted)))
            .collect::<Vec<_>>()
            .join(" AND ");

        sql.push(d.delete_matching(
            &final_id,
            "f",
            &winners,
            "w",
            &format!("{}\n    AND {}", pk_match, self.winner_not_older(stream)),
        ));

        let columns = self.final_columns(stream);
        sql.push(format!(
            "INSERT INTO {} ({})\nSELECT {}\nFROM {} AS w\nWHERE w.{} = 0\n  AND NOT EXISTS (\n    SELECT 1 FROM {} AS f\n    WHERE {}\n  )",
            final_id,
            columns.join(", "),
            columns
                .iter()
                .map(|c| format!("w.{}", c))
                .collect::<Vec<_>>()
                .join(", "),
            winners,
            d.quote_ident(COL_IS_DELETED),
            final_id,
            pk_match
        ));

        self.finish(stream, &mut sql);
        sql
    }

    /// Plain typed copy into `final_table + suffix`.
    pub(super) fn append_sql(
        &self,
        stream: &StreamConfig,
        suffix: &str,
        all_records: bool,
    ) -> GeneratedSql {
        let d = &self.dialect;
        let final_id = stream.id.final_table_id(d, suffix);
        let typed = d.temp_table_ref(TYPED_TABLE);

        let mut sql = self.begin();
        sql.push(d.create_temp_table_as(
            TYPED_TABLE,
            &self.typed_select(stream, all_records, false),
        ));
        let columns = self.final_columns(stream).join(", ");
        sql.push(format!(
            "INSERT INTO {} ({})\nSELECT {}\nFROM {}",
            final_id, columns, columns, typed
        ));
        self.finish(stream, &mut sql);
        sql
    }

    fn begin(&self) -> GeneratedSql {
        let d = &self.dialect;
        let mut sql = GeneratedSql::new();
        sql.transactional = true;
        sql.push(d.begin_transaction());
        sql.push(d.drop_temp_table(TYPED_TABLE));
        sql.push(d.drop_temp_table(WINNERS_TABLE));
        sql
    }

    /// Mark typed raw records loaded, drop staging tables, commit.
    fn finish(&self, stream: &StreamConfig, sql: &mut GeneratedSql) {
        let d = &self.dialect;
        let raw_id = d.quote_ident(COL_RAW_ID);
        sql.push(format!(
            "UPDATE {} SET {} = {}\nWHERE {} IN (SELECT {} FROM {})",
            stream.id.raw_table_id(d),
            d.quote_ident(COL_LOADED_AT),
            d.current_timestamp(),
            raw_id,
            raw_id,
            d.temp_table_ref(TYPED_TABLE)
        ));
        sql.push(d.drop_temp_table(TYPED_TABLE));
        sql.push(d.drop_temp_table(WINNERS_TABLE));
        sql.push(d.commit_transaction());
    }

    /// Final-table columns in DDL order, quoted.
    fn final_columns(&self, stream: &StreamConfig) -> Vec<String> {
        let d = &self.dialect;
        [COL_RAW_ID, COL_EXTRACTED_AT, COL_META]
            .iter()
            .map(|c| d.quote_ident(c))
            .chain(stream.columns.iter().map(|(c, _)| c.quoted.clone()))
            .collect()
    }

    /// Cast every column of the raw records into a typed row.
    ///
    /// A value that is present but fails its cast becomes NULL and adds an
    /// entry to the row's metadata instead of failing the statement.
    fn typed_select(&self, stream: &StreamConfig, all_records: bool, with_deletion: bool) -> String {
        let d = &self.dialect;
        let mut projections = Vec::with_capacity(stream.columns.len() + 4);
        let mut checks = Vec::new();

        for (column, ty) in &stream.columns {
            let target = self.column_type(ty);
            let cast = d.safe_cast(&column.original_name, &target);
            if !matches!(target.kind, DialectKind::Text | DialectKind::Serialized) {
                checks.push(CastCheck {
                    column: column.name.clone(),
                    reason: format!("could not cast value to {}", target.name),
                    failed: format!(
                        "{} AND ({}) IS NULL",
                        d.field_present(&column.original_name),
                        cast
                    ),
                });
            }
            projections.push(format!("{} AS {}", cast, column.quoted));
        }

        projections.push(format!("{} AS {}", d.build_meta(&checks), d.quote_ident(COL_META)));
        projections.push(d.quote_ident(COL_RAW_ID));
        projections.push(d.quote_ident(COL_EXTRACTED_AT));
        if with_deletion {
            projections.push(format!(
                "{} AS {}",
                d.deletion_flag(&self.options.deletion_field),
                d.quote_ident(COL_IS_DELETED)
            ));
        }

        let mut query = format!(
            "SELECT\n  {}\nFROM {}",
            projections.join(",\n  "),
            stream.id.raw_table_id(d)
        );
        if !all_records {
            query.push_str(&format!(
                "\nWHERE {} IS NULL",
                d.quote_ident(COL_LOADED_AT)
            ));
        }
        query
    }

    /// Newest record per primary key.
    fn winners_select(&self, stream: &StreamConfig, typed: &str) -> String {
        let d = &self.dialect;
        let partition = stream
            .primary_key
            .iter()
            .map(|pk| format!("t.{}", pk.quoted))
            .collect::<Vec<_>>()
            .join(", ");
        let order = RankTerm::order(self.options.deletion_policy, stream.cursor.is_some())
            .into_iter()
            .map(|term| match term {
                RankTerm::Cursor => match &stream.cursor {
                    Some(cursor) => d.order_desc_nulls_last(&format!("t.{}", cursor.quoted)),
                    None => String::new(),
                },
                RankTerm::Deleted => format!("t.{} DESC", d.quote_ident(COL_IS_DELETED)),
                RankTerm::ExtractedAt => format!("t.{} DESC", d.quote_ident(COL_EXTRACTED_AT)),
            })
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        let row_number = d.quote_ident(COL_ROW_NUMBER);

        format!(
            "SELECT * FROM (\n  SELECT t.*, ROW_NUMBER() OVER (PARTITION BY {} ORDER BY {}) AS {}\n  FROM {} AS t\n) AS ranked\nWHERE {} = 1",
            partition, order, row_number, typed, row_number
        )
    }

    /// Condition on final row `f` and winner `w`: the winner is at least as
    /// new as the existing row, so it may replace or delete it.
    fn winner_not_older(&self, stream: &StreamConfig) -> String {
        let d = &self.dialect;
        let ext = d.quote_ident(COL_EXTRACTED_AT);
        let mut alternatives = match &stream.cursor {
            Some(cursor) => {
                let c = &cursor.quoted;
                vec![
                    format!("(f.{c} IS NULL AND w.{c} IS NOT NULL)"),
                    format!("f.{c} < w.{c}"),
                    format!(
                        "({} AND f.{ext} <= w.{ext})",
                        d.null_safe_eq(&format!("f.{c}"), &format!("w.{c}"))
                    ),
                ]
            }
            None => vec![format!("f.{ext} <= w.{ext}")],
        };
        if self.options.deletion_policy == DeletionPolicy::AlwaysWins {
            alternatives.push(format!("w.{} = 1", d.quote_ident(COL_IS_DELETED)));
        }
        format!("({})", alternatives.join("\n      OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::SyncMode;
    use crate::generator::tests::{mssql, pg, users_stream};
    use crate::generator::MergeOptions;

    #[test]
    fn test_merge_statement_sequence() {
        let generator = pg();
        let stream = users_stream(generator.dialect(), SyncMode::AppendDedup);
        let sql = generator.update_table(&stream, "").unwrap();

        assert!(sql.transactional);
        assert_eq!(sql.statements.first().unwrap(), "BEGIN");
        assert_eq!(sql.statements.last().unwrap(), "COMMIT");
        assert!(sql.statements[3].starts_with("CREATE TEMPORARY TABLE \"_ab_typed\" AS"));
        assert!(sql.statements[4].starts_with("CREATE TEMPORARY TABLE \"_ab_winners\" AS"));
        assert!(sql.statements[5].starts_with("DELETE FROM \"public\".\"users\" AS f WHERE EXISTS"));
        assert!(sql.statements[6].starts_with("INSERT INTO \"public\".\"users\""));
        assert!(sql.statements[7].starts_with(
            "UPDATE \"airbyte_internal\".\"public_raw__stream_users\" SET \"_airbyte_loaded_at\" = now()"
        ));
    }

    #[test]
    fn test_typed_select_reads_unloaded_records() {
        let generator = pg();
        let stream = users_stream(generator.dialect(), SyncMode::AppendDedup);
        let select = generator.typed_select(&stream, false, true);
        assert!(select.ends_with(
            "FROM \"airbyte_internal\".\"public_raw__stream_users\"\nWHERE \"_airbyte_loaded_at\" IS NULL"
        ));
        assert!(select.contains(
            "CASE WHEN COALESCE(jsonb_typeof(\"_airbyte_data\"->'_ab_cdc_deleted_at'), 'null') <> 'null' THEN 1 ELSE 0 END AS \"_ab_is_deleted\""
        ));

        let all = generator.typed_select(&stream, true, true);
        assert!(!all.contains("_airbyte_loaded_at"));
    }

    #[test]
    fn test_cast_failures_feed_metadata() {
        let generator = pg();
        let stream = users_stream(generator.dialect(), SyncMode::AppendDedup);
        let select = generator.typed_select(&stream, false, false);

        // integer column: failed cast is recorded
        assert!(select.contains(
            "CASE WHEN COALESCE(jsonb_typeof(\"_airbyte_data\"->'id'), 'null') <> 'null' AND \
             (CASE WHEN pg_input_is_valid(\"_airbyte_data\"->>'id', 'bigint') THEN CAST(\"_airbyte_data\"->>'id' AS bigint) END) IS NULL \
             THEN jsonb_build_object('field', 'id', 'reason', 'could not cast value to bigint') END"
        ));
        // text columns cannot fail
        assert!(!select.contains("'field', 'name'"));
        assert!(select.contains("AS \"_airbyte_meta\""));
        assert!(!select.contains("_ab_is_deleted"));
    }

    #[test]
    fn test_newest_wins_ordering() {
        let generator = pg();
        let stream = users_stream(generator.dialect(), SyncMode::AppendDedup);
        let winners = generator.winners_select(&stream, "\"_ab_typed\"");
        assert!(winners.contains(
            "PARTITION BY t.\"id\" ORDER BY t.\"updated_at\" DESC NULLS LAST, t.\"_ab_is_deleted\" DESC, t.\"_airbyte_extracted_at\" DESC"
        ));
        assert!(winners.ends_with("WHERE \"_ab_row_number\" = 1"));
    }

    #[test]
    fn test_ordering_without_cursor() {
        let generator = pg();
        let mut stream = users_stream(generator.dialect(), SyncMode::AppendDedup);
        stream.cursor = None;
        let winners = generator.winners_select(&stream, "\"_ab_typed\"");
        assert!(winners.contains(
            "ORDER BY t.\"_airbyte_extracted_at\" DESC, t.\"_ab_is_deleted\" DESC)"
        ));
        assert_eq!(
            generator.winner_not_older(&stream),
            "(f.\"_airbyte_extracted_at\" <= w.\"_airbyte_extracted_at\")"
        );
    }

    #[test]
    fn test_always_wins_ordering() {
        let generator = pg().with_options(MergeOptions {
            deletion_policy: DeletionPolicy::AlwaysWins,
            deletion_field: "deleted_at".to_string(),
        });
        let stream = users_stream(generator.dialect(), SyncMode::AppendDedup);
        let winners = generator.winners_select(&stream, "\"_ab_typed\"");
        assert!(winners.contains("ORDER BY t.\"_ab_is_deleted\" DESC, t.\"updated_at\" DESC NULLS LAST"));
        assert!(generator
            .winner_not_older(&stream)
            .contains("OR w.\"_ab_is_deleted\" = 1"));
        assert!(generator
            .typed_select(&stream, false, true)
            .contains("->'deleted_at'"));
    }

    #[test]
    fn test_upsert_guards_against_late_records() {
        let generator = pg();
        let stream = users_stream(generator.dialect(), SyncMode::AppendDedup);
        let sql = generator.update_table(&stream, "").unwrap();
        let delete = &sql.statements[5];
        assert!(delete.contains("f.\"id\" IS NOT DISTINCT FROM w.\"id\""));
        assert!(delete.contains("f.\"updated_at\" < w.\"updated_at\""));
        let insert = &sql.statements[6];
        assert!(insert.contains("WHERE w.\"_ab_is_deleted\" = 0"));
        assert!(insert.contains("AND NOT EXISTS"));
    }

    #[test]
    fn test_append_has_no_dedup() {
        let generator = pg();
        let stream = users_stream(generator.dialect(), SyncMode::Append);
        let script = generator.update_table(&stream, "").unwrap().to_script();
        assert!(!script.contains("ROW_NUMBER"));
        assert!(!script.contains("DELETE"));
        assert!(script.contains(
            "INSERT INTO \"public\".\"users\" (\"_airbyte_raw_id\", \"_airbyte_extracted_at\", \"_airbyte_meta\", \"id\", \"updated_at\", \"name\", \"address\")\nSELECT"
        ));
    }

    #[test]
    fn test_overwrite_copies_into_shadow_table() {
        let generator = pg();
        let stream = users_stream(generator.dialect(), SyncMode::Overwrite);
        let script = generator
            .update_table(&stream, crate::generator::OVERWRITE_SUFFIX)
            .unwrap()
            .to_script();
        assert!(script.contains("INSERT INTO \"public\".\"users_ab_tmp\""));
        assert!(!script.contains("ROW_NUMBER"));
    }

    #[test]
    fn test_mssql_merge() {
        let generator = mssql();
        let stream = users_stream(generator.dialect(), SyncMode::AppendDedup);
        let sql = generator.update_table(&stream, "").unwrap();
        assert_eq!(sql.statements[0], "BEGIN TRANSACTION");
        assert!(sql.statements[3].starts_with("SELECT * INTO [#_ab_typed] FROM ("));
        assert!(sql.statements[4].contains(
            "ORDER BY CASE WHEN t.[updated_at] IS NULL THEN 1 ELSE 0 END, t.[updated_at] DESC, t.[_ab_is_deleted] DESC"
        ));
        assert!(sql.statements[5].starts_with("DELETE f FROM [public].[users] AS f WHERE EXISTS"));
        assert!(sql.statements[5].contains("(f.[id] = w.[id] OR (f.[id] IS NULL AND w.[id] IS NULL))"));
        assert!(sql.statements[7].contains("SYSDATETIMEOFFSET()"));
        assert_eq!(sql.statements.last().unwrap(), "COMMIT TRANSACTION");
    }

    /// In-memory ranking with the same terms the generated SQL orders by.
    fn winner<'a>(
        records: &'a [(Option<i64>, bool, i64, &'a str)],
        policy: DeletionPolicy,
    ) -> &'a (Option<i64>, bool, i64, &'a str) {
        let terms = RankTerm::order(policy, true);
        let mut sorted: Vec<_> = records.iter().collect();
        sorted.sort_by(|a, b| {
            for term in &terms {
                let ord = match term {
                    // NULLs last when descending
                    RankTerm::Cursor => b.0.is_some().cmp(&a.0.is_some()).then(b.0.cmp(&a.0)),
                    RankTerm::Deleted => b.1.cmp(&a.1),
                    RankTerm::ExtractedAt => b.2.cmp(&a.2),
                };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        sorted[0]
    }

    #[test]
    fn test_deletion_wins_cursor_tie() {
        // (cursor, deleted, extracted_at, value) for k=1
        let records = [
            (Some(5), false, 1, "a"),
            (Some(9), false, 2, "b"),
            (Some(9), true, 1, ""),
        ];
        let w = winner(&records, DeletionPolicy::NewestWins);
        assert!(w.1, "deletion must win, so k=1 has no row");

        let newer_update = [(Some(9), true, 1, ""), (Some(10), false, 1, "c")];
        assert_eq!(winner(&newer_update, DeletionPolicy::NewestWins).3, "c");
        assert!(winner(&newer_update, DeletionPolicy::AlwaysWins).1);
    }

    #[test]
    fn test_deletion_winner_deletes_row_and_skips_insert() {
        // k=1 receives (cursor 5, "a"), (cursor 9, "b") and a deletion at cursor 9
        let generator = pg();
        let stream = users_stream(generator.dialect(), SyncMode::AppendDedup);
        let sql = generator.update_table(&stream, "").unwrap();
        let winners = &sql.statements[4];
        let delete = &sql.statements[5];
        let insert = &sql.statements[6];

        // the tied deletion outranks the update
        assert!(winners.contains(
            "ORDER BY t.\"updated_at\" DESC NULLS LAST, t.\"_ab_is_deleted\" DESC"
        ));

        // the delete matches any winner at least as new, deletion or not
        assert!(delete.starts_with("DELETE FROM \"public\".\"users\" AS f WHERE EXISTS"));
        assert!(delete.contains("SELECT 1 FROM pg_temp.\"_ab_winners\" AS w"));
        assert!(delete.contains(
            "(f.\"updated_at\" IS NOT DISTINCT FROM w.\"updated_at\" \
             AND f.\"_airbyte_extracted_at\" <= w.\"_airbyte_extracted_at\")"
        ));
        assert!(!delete.contains("_ab_is_deleted"));

        // a deletion winner is never re-inserted, so k=1 ends with no row
        assert!(insert.contains(
            "FROM pg_temp.\"_ab_winners\" AS w\nWHERE w.\"_ab_is_deleted\" = 0\n  AND NOT EXISTS"
        ));
    }

    #[test]
    fn test_null_cursor_ranks_last() {
        let records = [(None, false, 9, "late"), (Some(1), false, 1, "cursor")];
        assert_eq!(winner(&records, DeletionPolicy::NewestWins).3, "cursor");
    }
}
