//! Destination driver implementations.
//!
//! - [`postgres`]: PostgreSQL dialect and pooled destination
//! - [`common`]: Shared utilities (TLS)
//!
//! # Adding New Destinations
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement the `Dialect` and `Destination` traits
//! 3. Construct them in place of the PostgreSQL pair when building a
//!    `SchemaExecutor`

pub mod common;
pub mod postgres;

// Re-export common utilities
pub use common::SslMode;

// Re-export driver types
pub use postgres::{PgDestination, PostgresDialect};
