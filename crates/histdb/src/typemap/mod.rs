//! Type resolution for destination columns.
//!
//! Maps an abstract data type plus a size hint to a PostgreSQL type, and
//! decides how a recorded column type must change to hold an incoming value.
//! Changes only ever widen: character limits grow, integers get wider,
//! integers promote to floating point or numeric, and anything else falls
//! back to `varchar`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HistError, Result};

/// Character columns wider than this are not indexed.
pub const MAX_TYPE_SIZE_INDEX: i64 = 2500;

/// Largest `varchar` length PostgreSQL accepts.
pub const MAX_VARCHAR_LENGTH: i64 = 10_485_760;

/// Abstract column data type carried by change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    Numeric,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    Text,
}

impl DataType {
    /// Token stored in the system catalog `attribute.attr_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Numeric => "numeric",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::TimeTz => "timetz",
            DataType::Timestamp => "timestamp",
            DataType::TimestampTz => "timestamptz",
            DataType::Uuid => "uuid",
            DataType::Json => "json",
            DataType::Text => "text",
        }
    }

    /// Position in the numeric promotion chain, if any.
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            DataType::Integer => Some(0),
            DataType::Float => Some(1),
            DataType::Numeric => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = HistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "boolean" => Ok(DataType::Boolean),
            "integer" => Ok(DataType::Integer),
            "float" => Ok(DataType::Float),
            "numeric" => Ok(DataType::Numeric),
            "date" => Ok(DataType::Date),
            "time" => Ok(DataType::Time),
            "timetz" => Ok(DataType::TimeTz),
            "timestamp" => Ok(DataType::Timestamp),
            "timestamptz" => Ok(DataType::TimestampTz),
            "uuid" => Ok(DataType::Uuid),
            "json" => Ok(DataType::Json),
            "text" => Ok(DataType::Text),
            other => Err(HistError::Config(format!("Unknown data type: {:?}", other))),
        }
    }
}

/// A recorded column type: data type plus normalized size.
///
/// Size is the byte width for integers and floats, the character limit for
/// text, and zero for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    pub data_type: DataType,
    pub size: i64,
}

impl ColumnType {
    /// Build a column type, normalizing the size hint for its data type.
    pub fn new(data_type: DataType, size: i64) -> Self {
        let size = match data_type {
            DataType::Integer => match size {
                i64::MIN..=2 => 2,
                3..=4 => 4,
                _ => 8,
            },
            DataType::Float => {
                if size <= 4 {
                    4
                } else {
                    8
                }
            }
            DataType::Text => size.clamp(1, MAX_VARCHAR_LENGTH),
            _ => 0,
        };
        Self { data_type, size }
    }

    /// Shorthand for a `varchar(n)` column type.
    pub fn varchar(size: i64) -> Self {
        Self::new(DataType::Text, size)
    }

    /// Destination SQL for this type.
    pub fn to_sql(&self) -> SqlType {
        data_type_to_sql(self.data_type, self.size)
    }

    /// Whether a btree index on a column of this type is maintained.
    pub fn is_indexable(&self) -> bool {
        match self.data_type {
            DataType::Json => false,
            DataType::Text => self.size <= MAX_TYPE_SIZE_INDEX,
            _ => true,
        }
    }

    /// Whether `next` holds every value this type holds.
    pub fn widens_to(&self, next: &ColumnType) -> bool {
        if self.data_type == next.data_type {
            return next.size >= self.size;
        }
        match (self.data_type.numeric_rank(), next.data_type.numeric_rank()) {
            (Some(from), Some(to)) => to > from,
            _ => next.data_type == DataType::Text && next.size >= text_width(self),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql().sql)
    }
}

/// Resolved destination type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlType {
    /// Type as written in DDL, e.g. `varchar(40)`.
    pub sql: String,
    /// Canonical recorded type.
    pub canonical: ColumnType,
    /// Character limit for text columns.
    pub char_max_len: Option<i64>,
}

/// Map an abstract data type and size hint to a destination type.
pub fn data_type_to_sql(data_type: DataType, size: i64) -> SqlType {
    let canonical = ColumnType::new(data_type, size);
    let sql = match canonical.data_type {
        DataType::Boolean => "boolean".to_string(),
        DataType::Integer => match canonical.size {
            2 => "smallint".to_string(),
            4 => "integer".to_string(),
            _ => "bigint".to_string(),
        },
        DataType::Float => {
            if canonical.size == 4 {
                "real".to_string()
            } else {
                "double precision".to_string()
            }
        }
        DataType::Numeric => "numeric".to_string(),
        DataType::Date => "date".to_string(),
        DataType::Time => "time".to_string(),
        DataType::TimeTz => "time with time zone".to_string(),
        DataType::Timestamp => "timestamp".to_string(),
        DataType::TimestampTz => "timestamptz".to_string(),
        DataType::Uuid => "uuid".to_string(),
        DataType::Json => "jsonb".to_string(),
        DataType::Text => format!("varchar({})", canonical.size),
    };
    let char_max_len = (canonical.data_type == DataType::Text).then_some(canonical.size);
    SqlType {
        sql,
        canonical,
        char_max_len,
    }
}

/// Longest text rendering of a value of the given type.
fn text_width(column_type: &ColumnType) -> i64 {
    match column_type.data_type {
        DataType::Boolean => 5,
        DataType::Integer => 20,
        DataType::Float => 24,
        DataType::Date => 13,
        DataType::Time => 15,
        DataType::TimeTz => 21,
        DataType::Timestamp => 29,
        DataType::TimestampTz => 35,
        DataType::Uuid => 36,
        DataType::Text => column_type.size,
        DataType::Numeric | DataType::Json => MAX_VARCHAR_LENGTH,
    }
}

/// How a recorded column must change to accept an incoming value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnChange {
    /// The recorded type already holds the value.
    Unchanged,
    /// Alter the column to `target`.
    Retype {
        target: ColumnType,
        /// Needs `USING "<col>"::<type>`.
        cast: bool,
        /// The column index must be dropped before altering.
        drop_index: bool,
    },
}

/// Decide whether `current` must change to hold a value of type `incoming`.
pub fn resolve_change(current: &ColumnType, incoming: &ColumnType) -> ColumnChange {
    if current.widens_to(incoming) && current != incoming {
        let same_family = current.data_type == incoming.data_type
            || (current.data_type.numeric_rank().is_some()
                && incoming.data_type.numeric_rank().is_some());
        if same_family {
            let target = if current.data_type == DataType::Integer
                && incoming.data_type == DataType::Float
            {
                ColumnType::new(DataType::Float, 8)
            } else {
                *incoming
            };
            return retype(current, target, false);
        }
    }

    // The incoming value fits the recorded type.
    if incoming.widens_to(current) {
        return ColumnChange::Unchanged;
    }

    // Incompatible families generalize to varchar.
    let size = text_width(current).max(text_width(incoming));
    let target = ColumnType::varchar(size);
    let cast = current.data_type != DataType::Text;
    if target == *current {
        return ColumnChange::Unchanged;
    }
    retype(current, target, cast)
}

fn retype(current: &ColumnType, target: ColumnType, cast: bool) -> ColumnChange {
    ColumnChange::Retype {
        target,
        cast,
        drop_index: current.is_indexable() && !target.is_indexable(),
    }
}
