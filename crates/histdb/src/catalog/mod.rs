//! Authoritative record of tracked tables, their columns and year partitions.
//!
//! Every mutation follows "alter the destination, then record": DDL runs
//! first, and the in-memory maps and the system catalog mirror are written
//! only once it succeeds. A failed step therefore leaves the catalog unchanged,
//! and because every DDL form is idempotent the recovery path is to retry the
//! same operation.
//!
//! Callers must not run two operations against the same table concurrently.
//! The maps sit behind an async `RwLock` that is never held across a
//! destination call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::command::Command;
use crate::core::identifier::{validate_identifier, validate_table_name};
use crate::core::schema::{Attribute, Column, Table};
use crate::ddl::SchemaExecutor;
use crate::error::{HistError, Result};
use crate::sysdb::{RelationRecord, SystemCatalog};
use crate::typemap::{data_type_to_sql, resolve_change, ColumnChange, ColumnType, DataType};

/// Read view of a table's recorded columns.
pub type TableSchema = BTreeMap<String, ColumnType>;

#[derive(Debug, Default)]
struct CatalogState {
    tables: HashMap<Table, RelationRecord>,
    columns: HashMap<Table, BTreeMap<String, Attribute>>,
    partition_years: HashSet<(Table, i32)>,
}

impl CatalogState {
    fn require_table(&self, table: &Table) -> Result<()> {
        if self.tables.contains_key(table) {
            Ok(())
        } else {
            Err(HistError::Consistency(format!("table {} is not registered", table)))
        }
    }

    fn attribute(&self, column: &Column) -> Result<&Attribute> {
        self.require_table(&column.table)?;
        self.columns
            .get(&column.table)
            .and_then(|columns| columns.get(&column.name))
            .ok_or_else(|| HistError::Consistency(format!("column {} is not registered", column)))
    }
}

/// The catalog of tracked destination tables.
pub struct Catalog {
    sysdb: Arc<SystemCatalog>,
    executor: SchemaExecutor,
    grant_roles: Vec<String>,
    state: RwLock<CatalogState>,
}

impl Catalog {
    /// Build the catalog from the system catalog mirror.
    ///
    /// Year partitions are not persisted; the first event of each year after
    /// a restart reissues the idempotent partition DDL.
    pub fn open(
        sysdb: Arc<SystemCatalog>,
        executor: SchemaExecutor,
        grant_roles: Vec<String>,
    ) -> Result<Self> {
        let mut state = CatalogState::default();
        for relation in sysdb.read_relations()? {
            state.columns.entry(relation.table.clone()).or_default();
            state.tables.insert(relation.table.clone(), relation);
        }
        for attribute in sysdb.read_attributes()? {
            let table = &attribute.column.table;
            let columns = state.columns.get_mut(table).ok_or_else(|| {
                HistError::Consistency(format!(
                    "attribute {} belongs to unregistered table",
                    attribute.column
                ))
            })?;
            columns.insert(attribute.column.name.clone(), attribute);
        }

        info!(
            "Loaded catalog: {} tables from {}",
            state.tables.len(),
            sysdb.path().display()
        );

        Ok(Self {
            sysdb,
            executor,
            grant_roles,
            state: RwLock::new(state),
        })
    }

    pub fn executor(&self) -> &SchemaExecutor {
        &self.executor
    }

    pub fn sysdb(&self) -> &SystemCatalog {
        &self.sysdb
    }

    /// Whether `table` is tracked.
    pub async fn table_exists(&self, table: &Table) -> bool {
        self.state.read().await.tables.contains_key(table)
    }

    /// Recorded column types of a tracked table.
    pub async fn table_schema(&self, table: &Table) -> Result<TableSchema> {
        let state = self.state.read().await;
        state.require_table(table)?;
        Ok(state
            .columns
            .get(table)
            .map(|columns| {
                columns
                    .iter()
                    .map(|(name, attr)| (name.clone(), attr.column_type()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Tracked relations, ordered by schema and name.
    pub async fn relations(&self) -> Vec<RelationRecord> {
        let state = self.state.read().await;
        let mut relations: Vec<_> = state.tables.values().cloned().collect();
        relations.sort_by(|a, b| a.table.cmp(&b.table));
        relations
    }

    /// Create a table with its history table and partitions, then register it.
    ///
    /// A no-op for tracked tables. On any DDL failure the table stays
    /// unregistered and the call can be retried.
    pub async fn create_new_table(
        &self,
        table: &Table,
        transformed: bool,
        parent: Option<&Table>,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.table_exists(table).await {
            debug!("{}: already tracked", table);
            return Ok(());
        }
        validate_identifier(&table.schema)?;
        validate_table_name(&table.name)?;

        self.executor
            .create_table_unit(table, &self.grant_roles, cancel)
            .await?;

        let record = RelationRecord {
            table: table.clone(),
            transformed,
            parent: parent.cloned(),
            source: source.to_string(),
        };
        self.sysdb.insert_relation(&record)?;

        let mut state = self.state.write().await;
        state.columns.entry(table.clone()).or_default();
        state.tables.insert(table.clone(), record);
        info!("Created table {}", table);
        Ok(())
    }

    /// Create the non-current year partition for `year` unless already
    /// created by this process.
    pub async fn add_part_year_if_not_exists(
        &self,
        table: &Table,
        year: i32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        {
            let state = self.state.read().await;
            state.require_table(table)?;
            if state.partition_years.contains(&(table.clone(), year)) {
                return Ok(());
            }
        }

        self.executor.create_year_partition(table, year, cancel).await?;

        self.state
            .write()
            .await
            .partition_years
            .insert((table.clone(), year));
        debug!("{}: partition for {} ready", table, year);
        Ok(())
    }

    /// Add a previously unseen column. Known columns are left unchanged.
    pub async fn add_column(
        &self,
        column: &Column,
        data_type: DataType,
        size: i64,
        primary_key: i16,
        cancel: &CancellationToken,
    ) -> Result<()> {
        {
            let state = self.state.read().await;
            state.require_table(&column.table)?;
            if state
                .columns
                .get(&column.table)
                .is_some_and(|columns| columns.contains_key(&column.name))
            {
                return Ok(());
            }
        }
        validate_identifier(&column.name)?;

        let sql_type = data_type_to_sql(data_type, size);
        self.executor
            .add_column(&column.table, &column.name, &sql_type, cancel)
            .await?;

        let attribute = Attribute::new(column.clone(), sql_type.canonical, primary_key);
        self.sysdb.upsert_attribute(&attribute)?;
        self.state
            .write()
            .await
            .columns
            .entry(column.table.clone())
            .or_default()
            .insert(column.name.clone(), attribute);
        info!("Added column {} {}", column, sql_type.sql);
        Ok(())
    }

    /// Alter a column so that values of `(data_type, size)` fit, then record
    /// the new type.
    pub async fn widen_column(
        &self,
        column: &Column,
        data_type: DataType,
        size: i64,
        cancel: &CancellationToken,
    ) -> Result<ColumnChange> {
        let current = self.state.read().await.attribute(column)?.column_type();
        let change = resolve_change(&current, &ColumnType::new(data_type, size));

        if let ColumnChange::Retype {
            target,
            cast,
            drop_index,
        } = &change
        {
            if *drop_index {
                self.executor
                    .drop_column_index(&column.table, &column.name, cancel)
                    .await?;
            }
            let sql_type = self
                .executor
                .alter_column_type(
                    &column.table,
                    &column.name,
                    target.data_type,
                    target.size,
                    *cast,
                    cancel,
                )
                .await?;
            self.update_column(column, sql_type.canonical).await?;
        }
        Ok(change)
    }

    /// Record a widened type for a column. Issues no DDL.
    ///
    /// Call only after the destination column has been altered. Narrowing the
    /// recorded type is a consistency error.
    pub async fn update_column(&self, column: &Column, new_type: ColumnType) -> Result<()> {
        let mut attribute = self.state.read().await.attribute(column)?.clone();
        let current = attribute.column_type();
        if new_type != current && !current.widens_to(&new_type) {
            return Err(HistError::Consistency(format!(
                "column {}: cannot change recorded type {} to {}",
                column, current, new_type
            )));
        }

        attribute.data_type = new_type.data_type;
        attribute.type_size = new_type.size;
        self.sysdb.upsert_attribute(&attribute)?;
        self.state
            .write()
            .await
            .columns
            .entry(column.table.clone())
            .or_default()
            .insert(column.name.clone(), attribute);
        info!("Column {} type changed: {} -> {}", column, current, new_type);
        Ok(())
    }

    /// [`create_new_table`](Self::create_new_table) for an inbound command.
    pub async fn add_table(
        &self,
        command: &Command,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let parent = command.parent();
        self.create_new_table(
            &command.table(),
            command.transformed,
            parent.as_ref(),
            source,
            cancel,
        )
        .await
    }

    /// Ensure the year partition for the command's source timestamp.
    pub async fn add_partition(&self, command: &Command, cancel: &CancellationToken) -> Result<()> {
        let year = command.year()?;
        self.add_part_year_if_not_exists(&command.table(), year, cancel)
            .await
    }

    /// Destination health check.
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<Duration> {
        self.executor.ping(cancel).await
    }
}
