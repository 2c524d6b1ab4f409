//! Core traits for destination schema evolution.
//!
//! - [`Dialect`]: DDL syntax strategy for a destination engine
//! - [`Destination`]: Executes statements against a destination database
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable DDL forms
//! - **Template Method**: `SchemaExecutor` drives both traits through fixed sequences

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::identifier::{HISTORY_SUFFIX, NONCURRENT_PREFIX, NONCURRENT_SUFFIX};
use crate::core::schema::Table;
use crate::ddl::Statement;
use crate::error::Result;
use crate::typemap::SqlType;

/// DDL syntax strategy for different destination engines.
///
/// Every method only builds statements; nothing is executed here. All
/// identifiers pass through the statement builder and are quoted.
pub trait Dialect: Send + Sync {
    /// The history table backing `table` (`<table>__`).
    fn history_table(&self, table: &Table) -> Table {
        Table::new(&table.schema, format!("{}{}", table.name, HISTORY_SUFFIX))
    }

    /// The non-current partition of `table` (`zzz___<table>___`).
    fn noncurrent_partition(&self, table: &Table) -> Table {
        Table::new(
            &table.schema,
            format!("{}{}{}", NONCURRENT_PREFIX, table.name, NONCURRENT_SUFFIX),
        )
    }

    /// The year partition of the non-current partition (`zzz___<table>___<year>`).
    fn year_partition(&self, table: &Table, year: i32) -> Table {
        Table::new(
            &table.schema,
            format!(
                "{}{}{}{:04}",
                NONCURRENT_PREFIX, table.name, NONCURRENT_SUFFIX, year
            ),
        )
    }

    /// Create a schema if absent and grant usage on it to each role.
    fn create_schema(&self, schema: &str, roles: &[String]) -> Result<Vec<Statement>>;

    /// Create the history table, its current and non-current partitions,
    /// their standard indexes and read grants.
    fn create_history_table(&self, table: &Table, roles: &[String]) -> Result<Vec<Statement>>;

    /// Create a year range-partition of the non-current partition.
    fn create_year_partition(&self, table: &Table, year: i32) -> Result<Statement>;

    /// Add a column to the history table.
    fn add_column(&self, table: &Table, column: &str, sql_type: &SqlType) -> Result<Statement>;

    /// Create the column index on the history table.
    fn create_column_index(&self, table: &Table, column: &str) -> Result<Statement>;

    /// Drop the column index from the history table.
    fn drop_column_index(&self, table: &Table, column: &str) -> Result<Statement>;

    /// Change a column type on the history table, with an explicit cast if
    /// `cast` is set.
    fn alter_column_type(
        &self,
        table: &Table,
        column: &str,
        sql_type: &SqlType,
        cast: bool,
    ) -> Result<Statement>;

    /// Health-check statement.
    fn ping(&self) -> Statement;
}

/// Execute statements against a destination database.
///
/// Every call honors `cancel` and the implementation's statement timeout.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Destination name used in error messages.
    fn name(&self) -> &str;

    /// Execute a single statement.
    async fn execute(&self, statement: &Statement, cancel: &CancellationToken) -> Result<()>;

    /// Execute statements as one multi-statement batch.
    ///
    /// A failure anywhere fails the whole batch, and the error carries the
    /// full batch text.
    async fn execute_batch(
        &self,
        statements: &[Statement],
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Run a health-check statement and return its round-trip latency.
    async fn ping(&self, statement: &Statement, cancel: &CancellationToken) -> Result<Duration>;
}
