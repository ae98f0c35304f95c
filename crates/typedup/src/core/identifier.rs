//! Identifier validation, quoting, and naming transforms.
//!
//! Generated SQL embeds table, schema, and column names directly in statement
//! text, since identifiers cannot be bound as parameters. Every identifier
//! therefore passes through [`validate_identifier`] and a dialect-specific
//! quoting function before it reaches a statement.

use sha2::{Digest, Sha256};

use crate::error::{Result, TypedupError};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - SQL Server: 128 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Hex digits of the name digest kept by [`fit_identifier`].
const FIT_HASH_LEN: usize = 8;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TypedupError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(TypedupError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(TypedupError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Shorten `name` to at most `max_len` bytes.
///
/// Names that fit are returned unchanged. Longer names keep a prefix and end
/// in `_` plus a short SHA-256 of the full name, so distinct long names stay
/// distinct once shortened and the result is stable across runs.
pub fn fit_identifier(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    let mut keep = max_len.saturating_sub(FIT_HASH_LEN + 1);
    while !name.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}_{}", &name[..keep], &digest[..FIT_HASH_LEN])
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_pg(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL Server identifier, doubling embedded closing brackets.
pub fn quote_mssql(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Escape a value for use inside a single-quoted SQL string literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Destination naming conventions.
///
/// Implementations must be deterministic and idempotent:
/// `namespace(namespace(x)) == namespace(x)`.
pub trait NamingTransform: Send + Sync {
    /// Convert a source namespace into a destination schema name.
    fn namespace(&self, raw: &str) -> String;

    /// Convert a source stream name into a destination table name.
    fn stream_name(&self, raw: &str) -> String;

    /// Convert a source field name into a destination column name.
    fn column_name(&self, raw: &str) -> String {
        self.stream_name(raw)
    }
}

/// Lower-case names, replace anything outside `[a-z0-9_]` with `_`, and
/// prefix names that start with a digit.
#[derive(Debug, Clone, Default)]
pub struct StandardNaming;

impl StandardNaming {
    pub fn new() -> Self {
        Self
    }

    fn convert(raw: &str) -> String {
        let mut out: String = raw
            .trim()
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_alphanumeric() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if out.is_empty() {
            out.push('_');
        }
        if out.starts_with(|c: char| c.is_ascii_digit()) {
            out.insert(0, '_');
        }
        out.truncate(MAX_IDENTIFIER_LENGTH);
        out
    }
}

impl NamingTransform for StandardNaming {
    fn namespace(&self, raw: &str) -> String {
        Self::convert(raw)
    }

    fn stream_name(&self, raw: &str) -> String {
        Self::convert(raw)
    }
}
