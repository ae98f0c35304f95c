//! SQL generation for final tables.
//!
//! [`SqlGenerator`] turns a [`StreamConfig`] into ordered statement sequences:
//!
//! - [`SqlGenerator::create_table`]: schema plus create-or-replace of the final
//!   (or a shadow) table
//! - [`SqlGenerator::update_table`]: type unloaded raw records and merge or
//!   append them into the final table
//! - [`SqlGenerator::soft_reset`]: rebuild from all raw records into a shadow
//!   table and swap it in
//! - [`SqlGenerator::overwrite_final_table`]: swap a shadow table into the
//!   live position
//!
//! Generation never touches a database. Every call returns text the caller
//! executes in order.

mod merge;

pub use merge::RankTerm;

use tracing::{debug, warn};

use crate::config::{Config, DedupConfig, DeletionPolicy};
use crate::core::stream::{
    GeneratedSql, StreamConfig, StreamId, SyncMode, COL_EXTRACTED_AT, COL_META, COL_RAW_ID,
};
pub use crate::core::stream::{OVERWRITE_SUFFIX, SOFT_RESET_SUFFIX};
use crate::core::traits::{Dialect, TypeCatalog};
use crate::core::types::AbstractType;
use crate::dialect::{to_dialect_type, DialectKind, DialectType, SupportedTypes, TypeTable};
use crate::drivers::DialectImpl;
use crate::error::{Result, TypedupError};

/// Merge behavior knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub deletion_policy: DeletionPolicy,
    /// Raw field whose non-null value marks a deletion.
    pub deletion_field: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        DedupConfig::default().into()
    }
}

impl From<DedupConfig> for MergeOptions {
    fn from(config: DedupConfig) -> Self {
        Self {
            deletion_policy: config.deletion_policy,
            deletion_field: config.deletion_field,
        }
    }
}

/// Generates typing and deduplication SQL for one destination.
#[derive(Debug, Clone)]
pub struct SqlGenerator {
    dialect: DialectImpl,
    type_table: TypeTable,
    supported: SupportedTypes,
    options: MergeOptions,
}

impl SqlGenerator {
    /// Create a generator with the dialect's default type table.
    pub fn new(dialect: DialectImpl, destination_version: &str) -> Self {
        let type_table = dialect.default_type_table();
        let supported = dialect.supported_types(destination_version);
        Self {
            dialect,
            type_table,
            supported,
            options: MergeOptions::default(),
        }
    }

    /// Create a generator for the configured destination.
    pub fn from_config(config: &Config) -> Result<Self> {
        let dialect = config.dialect()?;
        let type_table = config.type_table(&dialect);
        let supported = dialect.supported_types(&config.destination.version);
        Ok(Self {
            dialect,
            type_table,
            supported,
            options: config.dedup.clone().into(),
        })
    }

    pub fn with_type_table(mut self, type_table: TypeTable) -> Self {
        self.type_table = type_table;
        self
    }

    pub fn with_options(mut self, options: MergeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    pub fn type_table(&self) -> &TypeTable {
        &self.type_table
    }

    pub fn supported_types(&self) -> &SupportedTypes {
        &self.supported
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Destination column type for an abstract type.
    pub fn column_type(&self, ty: &AbstractType) -> DialectType {
        let mapped = to_dialect_type(ty, &self.type_table, &self.supported);
        if mapped.kind == DialectKind::Serialized {
            match ty {
                AbstractType::Union(_) | AbstractType::UnsupportedOneOf => {
                    warn!(abstract_type = %ty, column_type = %mapped, "no native type, storing serialized")
                }
                _ => debug!(abstract_type = %ty, column_type = %mapped, "storing serialized"),
            }
        }
        mapped
    }

    /// Reject identifiers the destination would truncate.
    ///
    /// A truncated shadow name can resolve to the live final table, so a
    /// suffixed name that does not fit is an error rather than a warning.
    fn check_identifiers(&self, id: &StreamId, suffix: &str) -> Result<()> {
        let max_len = self.dialect.max_identifier_length();
        let suffixed = format!("{}{}", id.final_name, suffix);
        for name in [
            &id.final_namespace,
            &suffixed,
            &id.raw_namespace,
            &id.raw_name,
        ] {
            if name.len() > max_len {
                return Err(TypedupError::invalid_stream(
                    id.to_string(),
                    format!(
                        "identifier {} is {} bytes, over the {} limit of {}",
                        name,
                        name.len(),
                        self.dialect.name(),
                        max_len
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Create (or replace) the final table, or a shadow table when `suffix`
    /// is non-empty.
    pub fn create_table(&self, stream: &StreamConfig, suffix: &str) -> Result<GeneratedSql> {
        stream.validate()?;
        self.check_identifiers(&stream.id, suffix)?;
        let d = &self.dialect;
        let table_id = stream.id.final_table_id(d, suffix);

        let mut columns = vec![
            format!(
                "{} {} NOT NULL",
                d.quote_ident(COL_RAW_ID),
                self.type_table.text.name
            ),
            format!(
                "{} {} NOT NULL",
                d.quote_ident(COL_EXTRACTED_AT),
                self.type_table.timestamp_tz.name
            ),
            format!(
                "{} {} NOT NULL",
                d.quote_ident(COL_META),
                self.type_table.serialized.name
            ),
        ];
        for (column, ty) in &stream.columns {
            columns.push(format!("{} {}", column.quoted, self.column_type(ty)));
        }

        let mut sql = GeneratedSql::new();
        sql.push(d.create_schema_if_not_exists(&stream.id.final_namespace));
        sql.push(d.drop_table_if_exists(&table_id));
        sql.push(format!(
            "CREATE TABLE {} (\n  {}\n)",
            table_id,
            columns.join(",\n  ")
        ));

        debug!(
            stream = %stream.id,
            table = %table_id,
            statements = sql.len(),
            "generated create table"
        );
        Ok(sql)
    }

    /// Type the raw records not yet loaded into `final_table + suffix`.
    ///
    /// Append-dedup streams are merged (one row per primary key); append and
    /// overwrite streams get a plain typed copy.
    pub fn update_table(&self, stream: &StreamConfig, final_suffix: &str) -> Result<GeneratedSql> {
        stream.validate()?;
        self.check_identifiers(&stream.id, final_suffix)?;
        let sql = match stream.sync_mode {
            SyncMode::AppendDedup => self.merge_sql(stream, final_suffix, false),
            SyncMode::Append | SyncMode::Overwrite => {
                self.append_sql(stream, final_suffix, false)
            }
        };
        debug!(
            stream = %stream.id,
            sync_mode = ?stream.sync_mode,
            statements = sql.len(),
            "generated update table"
        );
        Ok(sql)
    }

    /// Rebuild the final table from every raw record and swap it in.
    pub fn soft_reset(&self, stream: &StreamConfig) -> Result<GeneratedSql> {
        let mut sql = self.create_table(stream, SOFT_RESET_SUFFIX)?;
        sql.extend(match stream.sync_mode {
            SyncMode::AppendDedup => self.merge_sql(stream, SOFT_RESET_SUFFIX, true),
            SyncMode::Append | SyncMode::Overwrite => {
                self.append_sql(stream, SOFT_RESET_SUFFIX, true)
            }
        });
        sql.extend(self.overwrite_final_table(&stream.id, SOFT_RESET_SUFFIX)?);
        debug!(stream = %stream.id, statements = sql.len(), "generated soft reset");
        Ok(sql)
    }

    /// Atomically replace the final table with `final_table + suffix`.
    pub fn overwrite_final_table(&self, id: &StreamId, suffix: &str) -> Result<GeneratedSql> {
        if suffix.is_empty() {
            return Err(TypedupError::invalid_stream(
                id.to_string(),
                "overwrite requires a non-empty shadow table suffix",
            ));
        }
        self.check_identifiers(id, suffix)?;
        let d = &self.dialect;
        let mut sql = GeneratedSql::new();
        sql.transactional = true;
        sql.push(d.begin_transaction());
        sql.push(d.drop_table_if_exists(&id.final_table_id(d, "")));
        sql.push(d.rename_table(
            &id.final_namespace,
            &format!("{}{}", id.final_name, suffix),
            &id.final_name,
        ));
        sql.push(d.commit_transaction());
        Ok(sql)
    }
}
