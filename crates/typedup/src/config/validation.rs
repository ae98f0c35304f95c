//! Configuration validation.

use std::collections::HashSet;

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::core::stream::SyncMode;
use crate::drivers::DialectImpl;
use crate::error::{Result, TypedupError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Destination validation
    DialectImpl::from_db_type(&config.destination.dialect)?;
    if config.destination.raw_namespace.is_empty() {
        return Err(TypedupError::Config(
            "destination.raw_namespace is required".into(),
        ));
    }
    validate_identifier(&config.destination.raw_namespace)?;
    validate_identifier(&config.destination.default_namespace)?;
    if config.dedup.deletion_field.is_empty() {
        return Err(TypedupError::Config(
            "dedup.deletion_field cannot be empty".into(),
        ));
    }

    let mut seen = HashSet::new();
    for stream in &config.streams {
        if stream.name.is_empty() {
            return Err(TypedupError::Config("streams[].name is required".into()));
        }
        validate_identifier(&stream.name)?;

        let namespace = config.namespace_of(stream);
        validate_identifier(namespace)?;
        let label = format!("{}.{}", namespace, stream.name);
        if !seen.insert((namespace.to_string(), stream.name.clone())) {
            return Err(TypedupError::Config(format!(
                "stream {} is declared more than once",
                label
            )));
        }

        if !stream.json_schema.is_null() && !stream.json_schema.is_object() {
            return Err(TypedupError::Config(format!(
                "stream {}: json_schema must be an object",
                label
            )));
        }

        if stream.sync_mode == SyncMode::AppendDedup && stream.primary_key.is_empty() {
            return Err(TypedupError::Config(format!(
                "stream {}: append_dedup requires a primary_key",
                label
            )));
        }
        for field in &stream.primary_key {
            if !stream.has_field(field) {
                return Err(TypedupError::Config(format!(
                    "stream {}: primary key field '{}' is not in json_schema",
                    label, field
                )));
            }
        }
        if let Some(cursor) = &stream.cursor {
            if !stream.has_field(cursor) {
                return Err(TypedupError::Config(format!(
                    "stream {}: cursor field '{}' is not in json_schema",
                    label, cursor
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DedupConfig, DestinationConfig, StreamDefinition};
    use serde_json::json;

    fn valid_config() -> Config {
        Config {
            destination: DestinationConfig {
                dialect: "postgres".to_string(),
                version: "16".to_string(),
                default_namespace: "public".to_string(),
                raw_namespace: "airbyte_internal".to_string(),
                strict_columns: false,
                type_overrides: Default::default(),
            },
            dedup: DedupConfig::default(),
            streams: vec![StreamDefinition {
                namespace: Some("public".to_string()),
                name: "users".to_string(),
                sync_mode: SyncMode::AppendDedup,
                primary_key: vec!["id".to_string()],
                cursor: Some("updated_at".to_string()),
                json_schema: json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer"},
                        "updated_at": {"type": "string", "format": "date-time"}
                    }
                }),
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_unknown_dialect() {
        let mut config = valid_config();
        config.destination.dialect = "oracle".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown database type"));
    }

    #[test]
    fn test_empty_stream_name() {
        let mut config = valid_config();
        config.streams[0].name = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_streams() {
        let mut config = valid_config();
        let mut copy = config.streams[0].clone();
        copy.namespace = None;
        config.streams.push(copy);
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_dedup_requires_primary_key() {
        let mut config = valid_config();
        config.streams[0].primary_key.clear();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("requires a primary_key"));

        config.streams[0].sync_mode = SyncMode::Append;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_primary_key_must_be_declared() {
        let mut config = valid_config();
        config.streams[0].primary_key = vec!["missing".to_string()];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("'missing'"));
    }

    #[test]
    fn test_cursor_must_be_declared() {
        let mut config = valid_config();
        config.streams[0].cursor = Some("ts".to_string());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("cursor field 'ts'"));
    }

    #[test]
    fn test_empty_deletion_field() {
        let mut config = valid_config();
        config.dedup.deletion_field = String::new();
        assert!(validate(&config).is_err());
    }
}
