//! PostgreSQL destination: a deadpool-postgres pool that executes DDL.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_postgres::{Client, Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{CancelToken, Config as PgConfig};
use tokio_postgres_rustls::MakeRustlsConnect;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DestinationConfig;
use crate::core::traits::Destination;
use crate::ddl::Statement;
use crate::drivers::common::make_connector;
use crate::error::{HistError, Result};

/// Timeout for establishing a single connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL destination backed by a connection pool.
pub struct PgDestination {
    name: String,
    pool: Pool,
    tls: Option<MakeRustlsConnect>,
    statement_timeout: Duration,
}

impl PgDestination {
    /// Build the pool and verify that a connection can be established.
    pub async fn connect(config: &DestinationConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("histdb");
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);
        pg_config.options(&server_options(config.statement_timeout()));

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let tls = make_connector(config.ssl_mode)?;
        let manager = match &tls {
            Some(tls) => Manager::from_config(pg_config, tls.clone(), mgr_config),
            None => Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config),
        };
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| HistError::pool(e, "creating destination pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| HistError::pool(e, "testing destination connection"))?;
        client.simple_query("SELECT 1").await.map_err(|e| {
            HistError::destination(config.display_name(), "SELECT 1", describe_error(&e))
        })?;

        info!(
            "Connected to destination {}: {}:{}/{}",
            config.display_name(),
            config.host,
            config.port,
            config.database
        );

        Ok(Self {
            name: config.display_name().to_string(),
            pool,
            tls,
            statement_timeout: config.statement_timeout(),
        })
    }

    /// Run `sql` as one simple-query round trip, honoring `cancel` and the
    /// statement timeout.
    ///
    /// A cancelled or timed-out statement is also cancelled on the server,
    /// and its connection is closed instead of going back to the pool.
    async fn run(&self, sql: &str, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(HistError::Cancelled);
        }
        debug!(destination = %self.name, "executing: {}", sql);

        let acquire = async {
            self.pool
                .get()
                .await
                .map_err(|e| HistError::pool(e, "acquiring destination connection"))
        };
        let client = self.bounded(sql, acquire, cancel).await?;
        let server_token = client.cancel_token();

        let work = async {
            client
                .batch_execute(sql)
                .await
                .map_err(|e| HistError::destination(&self.name, sql, describe_error(&e)))
        };
        let result = self.bounded(sql, work, cancel).await;

        if is_abandoned(&result) {
            self.cancel_on_server(server_token).await;
            drop(Client::take(client));
        }
        result
    }

    async fn bounded<T, F>(&self, sql: &str, work: F, cancel: &CancellationToken) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HistError::Cancelled),
            result = tokio::time::timeout(self.statement_timeout, work) => match result {
                Ok(inner) => inner,
                Err(_) => Err(HistError::Timeout {
                    destination: self.name.clone(),
                    statement: sql.to_string(),
                    after: self.statement_timeout,
                }),
            },
        }
    }

    async fn cancel_on_server(&self, token: CancelToken) {
        let result = match &self.tls {
            Some(tls) => token.cancel_query(tls.clone()).await,
            None => token.cancel_query(tokio_postgres::NoTls).await,
        };
        match result {
            Ok(()) => warn!(destination = %self.name, "cancelled in-flight statement on server"),
            Err(e) => warn!(
                destination = %self.name,
                "failed to cancel in-flight statement on server: {}", e
            ),
        }
    }
}

/// Session options that make the server enforce the statement timeout too.
fn server_options(statement_timeout: Duration) -> String {
    format!("-c statement_timeout={}", statement_timeout.as_millis())
}

/// Whether the statement may still be running on the server.
fn is_abandoned<T>(result: &Result<T>) -> bool {
    matches!(result, Err(HistError::Cancelled) | Err(HistError::Timeout { .. }))
}

/// Render a driver error, preferring the server's SQLSTATE and message.
fn describe_error(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({}): {}", db.message(), db.code().code(), detail),
            None => format!("{} ({})", db.message(), db.code().code()),
        },
        None => err.to_string(),
    }
}

#[async_trait]
impl Destination for PgDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, statement: &Statement, cancel: &CancellationToken) -> Result<()> {
        self.run(statement.as_str(), cancel).await
    }

    async fn execute_batch(
        &self,
        statements: &[Statement],
        cancel: &CancellationToken,
    ) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        self.run(&Statement::batch(statements), cancel).await
    }

    async fn ping(&self, statement: &Statement, cancel: &CancellationToken) -> Result<Duration> {
        let start = Instant::now();
        self.run(statement.as_str(), cancel).await?;
        Ok(start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_options_carry_timeout() {
        assert_eq!(
            server_options(Duration::from_secs(300)),
            "-c statement_timeout=300000"
        );
    }

    #[test]
    fn test_abandoned_statements() {
        assert!(is_abandoned::<()>(&Err(HistError::Cancelled)));
        assert!(is_abandoned::<()>(&Err(HistError::Timeout {
            destination: "dw".to_string(),
            statement: "SELECT 1".to_string(),
            after: Duration::from_secs(1),
        })));
        assert!(!is_abandoned(&Ok(())));
        assert!(!is_abandoned::<()>(&Err(HistError::destination(
            "dw",
            "SELECT 1",
            "syntax error"
        ))));
    }
}
