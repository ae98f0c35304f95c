//! Error types for the typing and deduplication library.

use thiserror::Error;

/// Main error type for SQL generation and planning.
#[derive(Error, Debug)]
pub enum TypedupError {
    /// Configuration error (invalid YAML, missing fields, bad identifiers, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stream violates an invariant required by its sync mode
    #[error("Invalid stream {stream}: {message}")]
    InvalidStream { stream: String, message: String },

    /// Introspecting an existing table failed (connectivity, permissions, ...)
    #[error("Introspection failed for {table}: {message}")]
    Introspection { table: String, message: String },

    /// Existing final table lacks the metadata columns and must be migrated first
    #[error("Table {0} is missing metadata columns and has not been migrated")]
    TableNotMigrated(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TypedupError {
    /// Create an InvalidStream error
    pub fn invalid_stream(stream: impl Into<String>, message: impl Into<String>) -> Self {
        TypedupError::InvalidStream {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create an Introspection error
    pub fn introspection(table: impl Into<String>, message: impl Into<String>) -> Self {
        TypedupError::Introspection {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether the caller may retry the operation that produced this error.
    ///
    /// Only introspection failures qualify; everything else is deterministic
    /// given the same inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TypedupError::Introspection { .. })
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            TypedupError::Config(_) | TypedupError::Yaml(_) => 2,
            TypedupError::Introspection { .. } => 3,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for typedup operations.
pub type Result<T> = std::result::Result<T, TypedupError>;
