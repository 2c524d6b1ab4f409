//! Inbound change-event view consumed by the catalog.
//!
//! The event parser lives upstream; this is only the subset of its fields
//! that drive table creation and year partitioning.

use serde::{Deserialize, Serialize};

use crate::core::schema::Table;
use crate::error::{HistError, Result};

/// Parent table reference carried by transformed commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentTable {
    pub schema: String,
    pub table: String,
}

/// A parsed change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub schema_name: String,
    pub table_name: String,

    /// The table was derived from another table (e.g. JSON flattening).
    #[serde(default)]
    pub transformed: bool,

    /// Table this one was derived from; empty when not transformed.
    #[serde(default)]
    pub parent_table: ParentTable,

    /// Source commit timestamp, ISO-8601.
    pub source_timestamp: String,
}

impl Command {
    pub fn table(&self) -> Table {
        Table::new(&self.schema_name, &self.table_name)
    }

    /// The parent table, or `None` when the command carries no linkage.
    pub fn parent(&self) -> Option<Table> {
        if self.parent_table.schema.is_empty() && self.parent_table.table.is_empty() {
            None
        } else {
            Some(Table::new(&self.parent_table.schema, &self.parent_table.table))
        }
    }

    /// Year of the source timestamp.
    pub fn year(&self) -> Result<i32> {
        year_from_timestamp(&self.source_timestamp).map_err(|e| match e {
            HistError::Config(msg) => HistError::Config(format!(
                "adding partition for table {:?}: {}",
                self.table().to_string(),
                msg
            )),
            other => other,
        })
    }
}

/// Parse the year from the first four characters of a timestamp.
pub fn year_from_timestamp(timestamp: &str) -> Result<i32> {
    let prefix = timestamp
        .get(0..4)
        .ok_or_else(|| HistError::Config(format!("invalid year format: {:?}", timestamp)))?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HistError::Config(format!("invalid year format: {:?}", prefix)));
    }
    let year = prefix
        .parse::<i32>()
        .map_err(|_| HistError::Config(format!("invalid year format: {:?}", prefix)))?;
    validate_year(year)?;
    Ok(year)
}

/// Partition years are written as four digits and year 0 does not exist.
pub fn validate_year(year: i32) -> Result<()> {
    if (1..=9999).contains(&year) {
        Ok(())
    } else {
        Err(HistError::Config(format!(
            "year {} is outside the partitionable range 1..=9999",
            year
        )))
    }
}
