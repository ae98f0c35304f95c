//! Dialect type model and the abstract → dialect type mapper.
//!
//! - [`TypeTable`]: per-destination type names (data, overridable)
//! - [`SupportedTypes`]: kinds a destination version supports natively
//! - [`to_dialect_type`]: total mapping from [`AbstractType`](crate::core::AbstractType)
//! - [`acceptable_types`]: every type name a column may legitimately have
//!
//! # Usage
//!
//! ```rust,ignore
//! let dialect = PostgresDialect::new();
//! let table = dialect.default_type_table();
//! let supported = dialect.supported_types("16");
//! let column_type = to_dialect_type(&AbstractType::NUMBER, &table, &supported);
//! assert_eq!(column_type.name, "decimal");
//! ```

mod mapper;
mod table;

pub use mapper::{acceptable_types, primitive_kind, resolve_kind, to_dialect_type, type_name_matches};
pub use table::{
    normalize_type_name, DialectKind, DialectType, SupportedTypes, TypeEntry, TypeFamily,
    TypeTable,
};
