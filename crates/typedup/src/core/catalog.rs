//! Catalog parsing: configured streams to [`StreamConfig`]s.
//!
//! The [`CatalogParser`] applies the destination's [`NamingTransform`] to
//! namespaces, stream names, and column names, and resolves the collisions
//! the transform can introduce.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{Config, StreamDefinition};
use crate::drivers::DialectImpl;
use crate::error::{Result, TypedupError};

use super::identifier::{fit_identifier, validate_identifier, NamingTransform, StandardNaming};
use super::stream::{ColumnId, StreamConfig, StreamId, FINAL_TABLE_META_COLUMNS};
use super::traits::Dialect;
use super::types::AbstractType;

/// Converts configured streams into immutable [`StreamConfig`]s.
///
/// # Example
///
/// ```rust,ignore
/// let parser = CatalogParser::from_config(&config)?;
/// for stream in parser.parse_catalog(&config)? {
///     println!("{} -> {}", stream.id, stream.id.final_display());
/// }
/// ```
#[derive(Clone)]
pub struct CatalogParser {
    dialect: DialectImpl,
    naming: Arc<dyn NamingTransform>,
    raw_namespace: String,
}

impl CatalogParser {
    /// Create a parser using [`StandardNaming`].
    pub fn new(dialect: DialectImpl, raw_namespace: impl Into<String>) -> Self {
        Self {
            dialect,
            naming: Arc::new(StandardNaming::new()),
            raw_namespace: raw_namespace.into(),
        }
    }

    /// Create a parser for the configured destination.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.dialect()?,
            config.destination.raw_namespace.clone(),
        ))
    }

    /// Replace the naming transform.
    pub fn with_naming(mut self, naming: Arc<dyn NamingTransform>) -> Self {
        self.naming = naming;
        self
    }

    /// Parse every configured stream.
    ///
    /// Fails if two streams resolve to the same final table.
    pub fn parse_catalog(&self, config: &Config) -> Result<Vec<StreamConfig>> {
        let mut final_tables = HashSet::new();
        let mut parsed = Vec::with_capacity(config.streams.len());
        for definition in &config.streams {
            let stream = self.parse_stream(config.namespace_of(definition), definition)?;
            if !final_tables.insert(stream.id.final_display()) {
                return Err(TypedupError::invalid_stream(
                    stream.id.to_string(),
                    format!(
                        "final table {} is already used by another stream",
                        stream.id.final_display()
                    ),
                ));
            }
            parsed.push(stream);
        }
        Ok(parsed)
    }

    /// Parse one stream definition.
    pub fn parse_stream(
        &self,
        namespace: &str,
        definition: &StreamDefinition,
    ) -> Result<StreamConfig> {
        let id = StreamId::build(
            self.naming.as_ref(),
            namespace,
            &definition.name,
            &self.raw_namespace,
            self.dialect.max_identifier_length(),
        );
        for name in [
            &id.final_namespace,
            &id.final_name,
            &id.raw_namespace,
            &id.raw_name,
        ] {
            validate_identifier(name)?;
        }

        let mut taken: HashSet<String> = FINAL_TABLE_META_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .collect();
        let mut columns = Vec::new();
        if let Some(properties) = definition.properties() {
            for (field, schema) in properties {
                let name = self.unique_column_name(&id, field, &mut taken);
                validate_identifier(&name)?;
                columns.push((
                    ColumnId::new(&self.dialect, field.as_str(), name),
                    AbstractType::from_json_schema(schema),
                ));
            }
        }

        let find = |field: &str| -> Result<ColumnId> {
            columns
                .iter()
                .find(|(c, _)| c.original_name == field)
                .map(|(c, _)| c.clone())
                .ok_or_else(|| {
                    TypedupError::invalid_stream(
                        id.to_string(),
                        format!("field '{}' is not in the stream schema", field),
                    )
                })
        };
        let primary_key = definition
            .primary_key
            .iter()
            .map(|field| find(field))
            .collect::<Result<Vec<_>>>()?;
        let cursor = definition.cursor.as_deref().map(find).transpose()?;

        let stream = StreamConfig {
            id,
            sync_mode: definition.sync_mode,
            primary_key,
            cursor,
            columns,
        };
        stream.validate()?;
        debug!(
            stream = %stream.id,
            final_table = %stream.id.final_display(),
            columns = stream.columns.len(),
            "parsed stream"
        );
        Ok(stream)
    }

    fn unique_column_name(
        &self,
        id: &StreamId,
        field: &str,
        taken: &mut HashSet<String>,
    ) -> String {
        let max_len = self.dialect.max_identifier_length();
        let base = fit_identifier(&self.naming.column_name(field), max_len);
        let mut name = base.clone();
        let mut suffix = 1;
        while taken.contains(&name) {
            name = fit_identifier(&format!("{}_{}", base, suffix), max_len);
            suffix += 1;
        }
        if name != base {
            warn!(
                stream = %id,
                field,
                column = %name,
                "column name collides after naming transform, renamed"
            );
        }
        taken.insert(name.clone());
        name
    }
}
