//! DDL construction and execution.
//!
//! - [`statement`]: The only path by which SQL text is assembled
//! - [`executor`]: Runs dialect-built statements against a destination

pub mod executor;
pub mod statement;

#[cfg(test)]
pub(crate) mod mock;

pub use executor::{HealthReport, SchemaExecutor};
pub use statement::{Statement, StatementBuilder};
