//! # histdb
//!
//! Destination schema evolution for change-data-capture into PostgreSQL.
//!
//! For every change event the library makes sure the backing tables exist,
//! widens column types as source data changes shape, and keeps every row
//! version in a history table partitioned into current rows and yearly
//! ranges of superseded rows.
//!
//! - **Catalog**: tracked tables, columns and year partitions
//! - **SchemaExecutor**: quoted DDL built through one statement builder
//! - **Type resolution**: widening and cast decisions for column changes
//! - **SystemCatalog**: durable SQLite store with single-process locking
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use histdb::{Catalog, Config, SchemaExecutor, SystemCatalog, Table};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> histdb::Result<()> {
//!     let config = Config::load("histdb.yaml")?;
//!     let sysdb = Arc::new(SystemCatalog::init(&config.sysdb.path)?);
//!     let executor = SchemaExecutor::connect_postgres(&config.destination).await?;
//!     let catalog = Catalog::open(sysdb, executor, config.catalog.grant_roles.clone())?;
//!
//!     let cancel = CancellationToken::new();
//!     let orders = Table::new("public", "orders");
//!     catalog.create_new_table(&orders, false, None, "kafka", &cancel).await?;
//!     catalog.add_part_year_if_not_exists(&orders, 2024, &cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod ddl;
pub mod drivers;
pub mod error;
pub mod sysdb;
pub mod typemap;

// Re-exports for convenient access
pub use catalog::{Catalog, TableSchema};
pub use config::{CatalogConfig, Config, DestinationConfig, SysdbConfig};
pub use core::{Attribute, Column, Command, Table};
pub use ddl::{HealthReport, SchemaExecutor};
pub use error::{HistError, Result};
pub use sysdb::{DatabaseConnector, RelationRecord, SourceConnector, SystemCatalog};
pub use typemap::{ColumnChange, ColumnType, DataType};
