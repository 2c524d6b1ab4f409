//! Table and column identity types shared by the catalog, DDL layer and
//! system catalog.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::typemap::{ColumnType, DataType};

/// A tracked table, identified by `(schema, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Table {
    /// Schema name.
    pub schema: String,

    /// Table name (also the name of the current partition).
    pub name: String,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A column of a tracked table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub table: Table,
    pub name: String,
}

impl Column {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Table::new(schema, table),
            name: name.into(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

/// Full column record as mirrored in the system catalog `attribute` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub column: Column,

    /// Abstract data type.
    pub data_type: DataType,

    /// Normalized size (see [`ColumnType`]).
    pub type_size: i64,

    /// 1-based position in the primary key, or 0 when not a key column.
    pub primary_key: i16,
}

impl Attribute {
    pub fn new(column: Column, column_type: ColumnType, primary_key: i16) -> Self {
        Self {
            column,
            data_type: column_type.data_type,
            type_size: column_type.size,
            primary_key,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        ColumnType::new(self.data_type, self.type_size)
    }
}
