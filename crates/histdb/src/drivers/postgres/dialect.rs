//! PostgreSQL DDL dialect (Strategy pattern).
//!
//! Provides the PostgreSQL forms for history tables, list/range partitions,
//! column changes and grants.

use crate::core::command::validate_year;
use crate::core::identifier::index_name;
use crate::core::schema::Table;
use crate::core::traits::Dialect;
use crate::ddl::{Statement, StatementBuilder};
use crate::error::Result;
use crate::typemap::SqlType;

/// System columns indexed on the history table. Indexes on a partitioned
/// table cascade to every partition, including later year partitions.
const INDEXED_SYSTEM_COLUMNS: [&str; 2] = ["__start", "__origin"];

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn create_index(&self, relation: &Table, column: &str) -> Result<Statement> {
        Ok(StatementBuilder::new("CREATE INDEX IF NOT EXISTS ")
            .ident(&index_name(&relation.name, column))?
            .sql(" ON ")
            .table(relation)?
            .sql(" (")
            .ident(column)?
            .sql(")")
            .build())
    }

    fn grant_select(&self, relation: &Table, role: &str) -> Result<Statement> {
        Ok(StatementBuilder::new("GRANT SELECT ON ")
            .table(relation)?
            .sql(" TO ")
            .ident(role)?
            .build())
    }
}

impl Dialect for PostgresDialect {
    fn create_schema(&self, schema: &str, roles: &[String]) -> Result<Vec<Statement>> {
        let mut statements = vec![StatementBuilder::new("CREATE SCHEMA IF NOT EXISTS ")
            .ident(schema)?
            .build()];
        for role in roles {
            statements.push(
                StatementBuilder::new("GRANT USAGE ON SCHEMA ")
                    .ident(schema)?
                    .sql(" TO ")
                    .ident(role)?
                    .build(),
            );
        }
        Ok(statements)
    }

    fn create_history_table(&self, table: &Table, roles: &[String]) -> Result<Vec<Statement>> {
        let history = self.history_table(table);
        let noncurrent = self.noncurrent_partition(table);

        let mut statements = vec![
            StatementBuilder::new("CREATE TABLE IF NOT EXISTS ")
                .table(&history)?
                .sql(
                    " (__id bigint GENERATED BY DEFAULT AS IDENTITY, \
                     __cf boolean NOT NULL DEFAULT TRUE, \
                     __start timestamptz NOT NULL, \
                     __end timestamptz NOT NULL, \
                     __current boolean NOT NULL, \
                     __origin varchar(63) NOT NULL DEFAULT '') \
                     PARTITION BY LIST (__current)",
                )
                .build(),
            StatementBuilder::new("CREATE TABLE IF NOT EXISTS ")
                .table(table)?
                .sql(" PARTITION OF ")
                .table(&history)?
                .sql(" FOR VALUES IN (TRUE)")
                .build(),
            StatementBuilder::new("CREATE TABLE IF NOT EXISTS ")
                .table(&noncurrent)?
                .sql(" PARTITION OF ")
                .table(&history)?
                .sql(" FOR VALUES IN (FALSE) PARTITION BY RANGE (__start)")
                .build(),
        ];

        for column in INDEXED_SYSTEM_COLUMNS {
            statements.push(self.create_index(&history, column)?);
        }

        for role in roles {
            statements.push(self.grant_select(&history, role)?);
            statements.push(self.grant_select(table, role)?);
        }

        Ok(statements)
    }

    fn create_year_partition(&self, table: &Table, year: i32) -> Result<Statement> {
        validate_year(year)?;
        let start = format!("{:04}-01-01", year);
        let end = format!("{:04}-01-01", year + 1);
        Ok(StatementBuilder::new("CREATE TABLE IF NOT EXISTS ")
            .table(&self.year_partition(table, year))?
            .sql(" PARTITION OF ")
            .table(&self.noncurrent_partition(table))?
            .sql(" FOR VALUES FROM (")
            .literal(&start)
            .sql(") TO (")
            .literal(&end)
            .sql(")")
            .build())
    }

    fn add_column(&self, table: &Table, column: &str, sql_type: &SqlType) -> Result<Statement> {
        Ok(StatementBuilder::new("ALTER TABLE ")
            .table(&self.history_table(table))?
            .sql(" ADD COLUMN IF NOT EXISTS ")
            .ident(column)?
            .sql(" ")
            .sql_type(sql_type)
            .build())
    }

    fn create_column_index(&self, table: &Table, column: &str) -> Result<Statement> {
        self.create_index(&self.history_table(table), column)
    }

    fn drop_column_index(&self, table: &Table, column: &str) -> Result<Statement> {
        let history = self.history_table(table);
        Ok(StatementBuilder::new("DROP INDEX IF EXISTS ")
            .table(&Table::new(&history.schema, index_name(&history.name, column)))?
            .build())
    }

    fn alter_column_type(
        &self,
        table: &Table,
        column: &str,
        sql_type: &SqlType,
        cast: bool,
    ) -> Result<Statement> {
        let mut builder = StatementBuilder::new("ALTER TABLE ")
            .table(&self.history_table(table))?
            .sql(" ALTER COLUMN ")
            .ident(column)?
            .sql(" TYPE ")
            .sql_type(sql_type);
        if cast {
            builder = builder
                .sql(" USING ")
                .ident(column)?
                .sql("::")
                .sql_type(sql_type);
        }
        Ok(builder.build())
    }

    fn ping(&self) -> Statement {
        StatementBuilder::new("SELECT 1").build()
    }
}
