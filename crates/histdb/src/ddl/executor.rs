//! Executes dialect-built DDL against a destination.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::DestinationConfig;
use crate::core::schema::Table;
use crate::core::traits::{Destination, Dialect};
use crate::drivers::{PgDestination, PostgresDialect};
use crate::error::{HistError, Result};
use crate::typemap::{data_type_to_sql, DataType, SqlType};

/// Outcome of a destination health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub destination: String,
    pub connected: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Turns catalog operations into destination statements.
///
/// Every destination error carries the destination name and the failed
/// statement (the whole batch text for batched units).
#[derive(Clone)]
pub struct SchemaExecutor {
    dialect: Arc<dyn Dialect>,
    destination: Arc<dyn Destination>,
}

impl SchemaExecutor {
    pub fn new(dialect: Arc<dyn Dialect>, destination: Arc<dyn Destination>) -> Self {
        Self {
            dialect,
            destination,
        }
    }

    /// Connect to a PostgreSQL destination.
    pub async fn connect_postgres(config: &DestinationConfig) -> Result<Self> {
        let destination = PgDestination::connect(config).await?;
        Ok(Self::new(Arc::new(PostgresDialect::new()), Arc::new(destination)))
    }

    pub fn destination_name(&self) -> &str {
        self.destination.name()
    }

    /// Create the schema, history table, both partitions, their indexes and
    /// grants as one batch.
    pub async fn create_table_unit(
        &self,
        table: &Table,
        grant_roles: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut statements = self.dialect.create_schema(&table.schema, grant_roles)?;
        trace!("{}: schema statements built", table);
        statements.extend(self.dialect.create_history_table(table, grant_roles)?);
        trace!("{}: {} statements in creation batch", table, statements.len());
        self.destination.execute_batch(&statements, cancel).await
    }

    /// Create the year range-partition of the non-current partition.
    pub async fn create_year_partition(
        &self,
        table: &Table,
        year: i32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let statement = self.dialect.create_year_partition(table, year)?;
        self.destination.execute(&statement, cancel).await
    }

    /// Add a column to the history table, indexing it when its type allows.
    pub async fn add_column(
        &self,
        table: &Table,
        column: &str,
        sql_type: &SqlType,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut statements = vec![self.dialect.add_column(table, column, sql_type)?];
        if sql_type.canonical.is_indexable() {
            statements.push(self.dialect.create_column_index(table, column)?);
        }
        self.destination.execute_batch(&statements, cancel).await
    }

    /// Change a column's type on the history table.
    ///
    /// The caller must record the returned type with `Catalog::update_column`
    /// only after this succeeds.
    pub async fn alter_column_type(
        &self,
        table: &Table,
        column: &str,
        data_type: DataType,
        size: i64,
        cast: bool,
        cancel: &CancellationToken,
    ) -> Result<SqlType> {
        let sql_type = data_type_to_sql(data_type, size);
        let statement = self
            .dialect
            .alter_column_type(table, column, &sql_type, cast)?;
        debug!("{}.{}: altering type to {} (cast: {})", table, column, sql_type.sql, cast);
        self.destination.execute(&statement, cancel).await?;
        Ok(sql_type)
    }

    /// Drop the column index from the history table.
    pub async fn drop_column_index(
        &self,
        table: &Table,
        column: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        warn!("{}.{}: dropping column index ahead of widening past indexable size", table, column);
        let statement = self.dialect.drop_column_index(table, column)?;
        self.destination.execute(&statement, cancel).await
    }

    /// Health check; returns the measured round-trip latency.
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<Duration> {
        self.destination.ping(&self.dialect.ping(), cancel).await
    }

    /// Ping the destination and summarize the result. Only cancellation is
    /// returned as an error; connection failures land in the report.
    pub async fn health_check(&self, cancel: &CancellationToken) -> Result<HealthReport> {
        let checked_at = Utc::now();
        let (connected, latency_ms, error) = match self.ping(cancel).await {
            Ok(latency) => (true, latency.as_millis() as u64, None),
            Err(HistError::Cancelled) => return Err(HistError::Cancelled),
            Err(e) => (false, 0, Some(e.to_string())),
        };
        Ok(HealthReport {
            destination: self.destination_name().to_string(),
            connected,
            latency_ms,
            error,
            checked_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::index_name;
    use crate::ddl::mock::RecordingDestination;
    use crate::typemap::ColumnType;

    fn executor() -> (SchemaExecutor, Arc<RecordingDestination>) {
        let dest = Arc::new(RecordingDestination::new());
        let exec = SchemaExecutor::new(Arc::new(PostgresDialect::new()), dest.clone());
        (exec, dest)
    }

    fn orders() -> Table {
        Table::new("public", "orders")
    }

    #[tokio::test]
    async fn test_create_table_unit_is_one_batch() {
        let (exec, dest) = executor();
        exec.create_table_unit(&orders(), &["analyst".to_string()], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(dest.round_trips(), 1);
        let executed = dest.executed();
        assert_eq!(executed[0], "CREATE SCHEMA IF NOT EXISTS \"public\"");
        assert_eq!(dest.count_matching("GRANT"), 3);
        assert_eq!(dest.count_matching("CREATE INDEX IF NOT EXISTS"), 2);
    }

    #[tokio::test]
    async fn test_batch_failure_carries_whole_batch() {
        let (exec, dest) = executor();
        dest.fail_on("FOR VALUES IN (FALSE)");
        let err = exec
            .create_table_unit(&orders(), &[], &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            HistError::Destination {
                destination,
                statement,
                ..
            } => {
                assert_eq!(destination, "recording");
                assert!(statement.contains("CREATE SCHEMA IF NOT EXISTS"));
                assert!(statement.contains("FOR VALUES IN (FALSE)"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(dest.executed().is_empty());
    }

    #[tokio::test]
    async fn test_add_column_indexes_indexable_types() {
        let (exec, dest) = executor();
        let cancel = CancellationToken::new();
        exec.add_column(&orders(), "sku", &ColumnType::varchar(20).to_sql(), &cancel)
            .await
            .unwrap();
        exec.add_column(
            &orders(),
            "payload",
            &ColumnType::new(DataType::Json, 0).to_sql(),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(dest.count_matching("ADD COLUMN IF NOT EXISTS"), 2);
        assert_eq!(dest.count_matching("CREATE INDEX IF NOT EXISTS"), 1);
        assert_eq!(dest.count_matching(&index_name("orders__", "sku")), 1);
    }

    #[tokio::test]
    async fn test_alter_column_type_returns_resolved_type() {
        let (exec, dest) = executor();
        let sql_type = exec
            .alter_column_type(&orders(), "qty", DataType::Text, 30, true, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sql_type.sql, "varchar(30)");
        assert_eq!(sql_type.char_max_len, Some(30));
        assert_eq!(
            dest.executed(),
            vec!["ALTER TABLE \"public\".\"orders__\" ALTER COLUMN \"qty\" TYPE varchar(30) USING \"qty\"::varchar(30)"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_issues_nothing() {
        let (exec, dest) = executor();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = exec
            .create_year_partition(&orders(), 2020, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, HistError::Cancelled));
        assert!(dest.executed().is_empty());
    }

    #[tokio::test]
    async fn test_ping() {
        let (exec, dest) = executor();
        exec.ping(&CancellationToken::new()).await.unwrap();
        assert_eq!(dest.executed(), vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn test_health_check_reports_failure() {
        let (exec, dest) = executor();
        let report = exec.health_check(&CancellationToken::new()).await.unwrap();
        assert!(report.connected);
        assert!(report.error.is_none());

        dest.fail_on("SELECT 1");
        let report = exec.health_check(&CancellationToken::new()).await.unwrap();
        assert!(!report.connected);
        assert_eq!(report.destination, "recording");
        assert!(report.error.unwrap().contains("SELECT 1"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            exec.health_check(&cancel).await,
            Err(HistError::Cancelled)
        ));
    }
}
