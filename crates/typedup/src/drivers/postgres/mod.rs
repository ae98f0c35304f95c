//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL

mod dialect;

pub use dialect::PostgresDialect;
