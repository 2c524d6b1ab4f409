//! Single construction path for generated SQL.
//!
//! [`StatementBuilder`] only accepts static SQL fragments, quoted identifiers,
//! encoded literals and resolver-produced types, so no caller-supplied name
//! reaches the destination unquoted.

use std::fmt;

use crate::core::identifier::{encode_string, qualify_pg, quote_pg};
use crate::core::schema::Table;
use crate::error::Result;
use crate::typemap::SqlType;

/// A complete SQL statement ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement(String);

impl Statement {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join statements into one multi-statement batch.
    pub fn batch(statements: &[Statement]) -> String {
        statements
            .iter()
            .map(|s| s.0.as_str())
            .collect::<Vec<_>>()
            .join(";\n")
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builder for a [`Statement`].
#[derive(Debug, Default)]
pub struct StatementBuilder {
    sql: String,
}

impl StatementBuilder {
    pub fn new(sql: &'static str) -> Self {
        Self {
            sql: sql.to_string(),
        }
    }

    /// Append a static SQL fragment.
    pub fn sql(mut self, fragment: &'static str) -> Self {
        self.sql.push_str(fragment);
        self
    }

    /// Append a quoted identifier.
    pub fn ident(mut self, name: &str) -> Result<Self> {
        self.sql.push_str(&quote_pg(name)?);
        Ok(self)
    }

    /// Append a schema-qualified table name.
    pub fn table(mut self, table: &Table) -> Result<Self> {
        self.sql.push_str(&qualify_pg(&table.schema, &table.name)?);
        Ok(self)
    }

    /// Append an extended-escape string literal.
    pub fn literal(mut self, value: &str) -> Self {
        self.sql.push_str(&encode_string(value));
        self
    }

    /// Append a destination type produced by the type resolver.
    pub fn sql_type(mut self, sql_type: &SqlType) -> Self {
        self.sql.push_str(&sql_type.sql);
        self
    }

    pub fn build(self) -> Statement {
        Statement(self.sql)
    }
}
