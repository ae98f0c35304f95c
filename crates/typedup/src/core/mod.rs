//! Core abstractions for typing and deduplication.
//!
//! - [`types`]: the abstract column type model
//! - [`identifier`]: identifier validation, quoting, and naming transforms
//! - [`stream`]: stream, column, and table identity types
//! - [`traits`]: dialect, type catalog, and schema introspection seams
//! - [`catalog`]: configured streams to [`StreamConfig`]s
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable SQL syntax
//! - **Data over subclasses**: type tables are injected values, not trait impls

pub mod catalog;
pub mod identifier;
pub mod stream;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use catalog::CatalogParser;
pub use identifier::{NamingTransform, StandardNaming};
pub use stream::{ColumnId, ExistingTableSchema, GeneratedSql, StreamConfig, StreamId, SyncMode};
pub use traits::{CastCheck, Dialect, SchemaIntrospector, TypeCatalog};
pub use types::{AbstractType, PrimitiveKind};
