//! Relation and attribute mirror of the catalog.

use rusqlite::params;
use serde::Serialize;

use super::SystemCatalog;
use crate::core::schema::{Attribute, Column, Table};
use crate::error::{HistError, Result};
use crate::typemap::DataType;

/// A tracked relation with its parent linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationRecord {
    pub table: Table,
    pub transformed: bool,
    pub parent: Option<Table>,
    pub source: String,
}

impl RelationRecord {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            transformed: false,
            parent: None,
            source: String::new(),
        }
    }
}

impl SystemCatalog {
    /// Record a relation. Recording an already known relation is a no-op.
    pub fn insert_relation(&self, relation: &RelationRecord) -> Result<()> {
        let (parent_schema, parent_name) = match &relation.parent {
            Some(parent) => (parent.schema.as_str(), parent.name.as_str()),
            None => ("", ""),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO relation (rel_schema, rel_name, transformed, parent_schema, parent_name, source) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT (rel_schema, rel_name) DO NOTHING",
                params![
                    relation.table.schema,
                    relation.table.name,
                    relation.transformed,
                    parent_schema,
                    parent_name,
                    relation.source
                ],
            )?;
            Ok(())
        })
    }

    /// Insert or replace a column record.
    pub fn upsert_attribute(&self, attribute: &Attribute) -> Result<()> {
        let column = &attribute.column;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO attribute (rel_schema, rel_name, attr_name, attr_type, attr_type_size, pkey) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT (rel_schema, rel_name, attr_name) DO UPDATE SET \
                 attr_type = excluded.attr_type, \
                 attr_type_size = excluded.attr_type_size, \
                 pkey = excluded.pkey",
                params![
                    column.table.schema,
                    column.table.name,
                    column.name,
                    attribute.data_type.as_str(),
                    attribute.type_size,
                    attribute.primary_key
                ],
            )?;
            Ok(())
        })
    }

    pub fn read_relations(&self) -> Result<Vec<RelationRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT rel_schema, rel_name, transformed, parent_schema, parent_name, source \
                 FROM relation ORDER BY rel_schema, rel_name",
            )?;
            let rows = stmt.query_map([], |row| {
                let parent_schema: String = row.get(3)?;
                let parent_name: String = row.get(4)?;
                let parent = if parent_schema.is_empty() && parent_name.is_empty() {
                    None
                } else {
                    Some(Table::new(parent_schema, parent_name))
                };
                Ok(RelationRecord {
                    table: Table::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                    transformed: row.get(2)?,
                    parent,
                    source: row.get(5)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn read_attributes(&self) -> Result<Vec<Attribute>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT rel_schema, rel_name, attr_name, attr_type, attr_type_size, pkey \
                 FROM attribute ORDER BY rel_schema, rel_name, attr_name",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    Column::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ),
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i16>(5)?,
                ))
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })?;

        rows.into_iter()
            .map(|(column, token, type_size, primary_key)| {
                let data_type: DataType = token.parse().map_err(|_| {
                    HistError::Consistency(format!(
                        "attribute {} has unknown type {:?}",
                        column, token
                    ))
                })?;
                Ok(Attribute {
                    column,
                    data_type,
                    type_size,
                    primary_key,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::ColumnType;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SystemCatalog {
        SystemCatalog::init_create(dir.path().join("sysdb.sqlite")).unwrap()
    }

    #[test]
    fn test_relation_round_trip_with_parent() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let record = RelationRecord {
            table: Table::new("public", "orders__items"),
            transformed: true,
            parent: Some(Table::new("public", "orders")),
            source: "kafka".to_string(),
        };
        db.insert_relation(&record).unwrap();
        db.insert_relation(&record).unwrap();
        db.insert_relation(&RelationRecord::new(Table::new("public", "orders")))
            .unwrap();

        let relations = db.read_relations().unwrap();
        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0].table.name, "orders");
        assert_eq!(relations[0].parent, None);
        assert_eq!(relations[1], record);
    }

    #[test]
    fn test_attribute_upsert_replaces() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let column = Column::new("public", "orders", "note");
        db.upsert_attribute(&Attribute::new(column.clone(), ColumnType::varchar(10), 0))
            .unwrap();
        db.upsert_attribute(&Attribute::new(column.clone(), ColumnType::varchar(4000), 0))
            .unwrap();

        let attrs = db.read_attributes().unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].column, column);
        assert_eq!(attrs[0].data_type, DataType::Text);
        assert_eq!(attrs[0].type_size, 4000);
    }

    #[test]
    fn test_unknown_attribute_type_is_inconsistent() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO attribute VALUES ('public', 'orders', 'x', 'money', 0, 0)",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        assert!(matches!(db.read_attributes(), Err(HistError::Consistency(_))));
    }
}
