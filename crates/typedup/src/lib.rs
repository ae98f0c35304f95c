//! # typedup
//!
//! Typing and deduplication SQL generation for replicated data.
//!
//! Raw, untyped records land in an append-only raw table. This library
//! generates the SQL that materializes them into a final table that is:
//!
//! - **Typed** per column, with uncastable values recorded in a metadata column
//! - **Deduplicated** to one current row per primary key
//! - **Evolvable** via schema diffing, soft resets, and atomic overwrites
//!
//! Generation is pure: nothing here opens a connection or executes a statement.
//!
//! ## Example
//!
//! ```rust,no_run
//! use typedup::{CatalogParser, Config, TyperDeduper};
//!
//! fn main() -> typedup::Result<()> {
//!     let config = Config::load("typedup.yaml")?;
//!     let streams = CatalogParser::from_config(&config)?.parse_catalog(&config)?;
//!     let planner = TyperDeduper::from_config(&config)?;
//!     for stream in &streams {
//!         println!("{}", planner.prepare_stream(stream, None)?.sql);
//!         println!("{}", planner.typing_and_deduping(stream)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod diff;
pub mod drivers;
pub mod error;
pub mod generator;
pub mod planner;

// Re-exports for convenient access
pub use config::{Config, DedupConfig, DeletionPolicy, DestinationConfig, StreamDefinition};
pub use crate::core::{
    AbstractType, CatalogParser, ColumnId, Dialect, ExistingTableSchema, GeneratedSql,
    SchemaIntrospector, StreamConfig, StreamId, SyncMode, TypeCatalog,
};
pub use diff::{evaluate_existing, matches, SchemaVerdict};
pub use drivers::{DialectImpl, MssqlDialect, PostgresDialect};
pub use error::{Result, TypedupError};
pub use generator::{MergeOptions, SqlGenerator};
pub use planner::{PlannedAction, StreamPlan, TyperDeduper};
