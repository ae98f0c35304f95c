//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL

mod dialect;

pub use dialect::MssqlDialect;
