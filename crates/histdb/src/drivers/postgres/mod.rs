//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: DDL syntax strategy for PostgreSQL
//! - [`PgDestination`]: Pooled destination that executes the DDL

mod destination;
mod dialect;

pub use destination::PgDestination;
pub use dialect::PostgresDialect;
