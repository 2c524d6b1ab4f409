//! Connector configuration storage.
//!
//! Only the storage layer lives here; creating and editing connectors is the
//! job of configuration tooling.

use std::fmt;

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::SystemCatalog;
use crate::error::{HistError, Result};

/// A destination database connector (`connect_database`).
#[derive(Clone, Default, Serialize)]
pub struct DatabaseConnector {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: String,
    pub db_host: String,
    pub db_port: String,
    pub db_name: String,
    pub db_user: String,
    #[serde(skip_serializing)]
    pub db_password: String,
    pub db_ssl_mode: String,
}

impl fmt::Debug for DatabaseConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnector")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("db_type", &self.db_type)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("db_ssl_mode", &self.db_ssl_mode)
            .finish()
    }
}

/// A Kafka source connector with its topics, schema pass-filters and linked
/// databases (by name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceConnector {
    pub id: i64,
    pub name: String,
    pub brokers: String,
    pub topics: Vec<String>,
    pub group_id: String,
    pub schema_pass_filter: Vec<String>,
    pub schema_prefix: String,
    pub databases: Vec<String>,
}

impl SystemCatalog {
    /// Store a database connector and return its id.
    pub fn insert_database_connector(&self, connector: &DatabaseConnector) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO connect_database \
                 (name, type, dbhost, dbport, dbname, dbuser, dbpassword, dbsslmode) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    connector.name,
                    connector.db_type,
                    connector.db_host,
                    connector.db_port,
                    connector.db_name,
                    connector.db_user,
                    connector.db_password,
                    connector.db_ssl_mode
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn read_database_connectors(&self) -> Result<Vec<DatabaseConnector>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, type, dbhost, dbport, dbname, dbuser, dbpassword, dbsslmode \
                 FROM connect_database ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(DatabaseConnector {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    db_type: row.get(2)?,
                    db_host: row.get(3)?,
                    db_port: row.get(4)?,
                    db_name: row.get(5)?,
                    db_user: row.get(6)?,
                    db_password: row.get(7)?,
                    db_ssl_mode: row.get(8)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Store a source connector with its child rows in one transaction and
    /// return its id. Every linked database must already exist.
    pub fn insert_source_connector(&self, connector: &SourceConnector) -> Result<i64> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO connect_source_kafka (name, brokers, group_id, schema_prefix) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    connector.name,
                    connector.brokers,
                    connector.group_id,
                    connector.schema_prefix
                ],
            )?;
            let id = tx.last_insert_rowid();

            for topic in &connector.topics {
                tx.execute(
                    "INSERT INTO connect_source_kafka_topic (source_id, topic) VALUES (?1, ?2)",
                    params![id, topic],
                )?;
            }
            for filter in &connector.schema_pass_filter {
                tx.execute(
                    "INSERT INTO connect_source_kafka_schema_pass_filter (source_id, schema_pass_filter) \
                     VALUES (?1, ?2)",
                    params![id, filter],
                )?;
            }
            for database in &connector.databases {
                let database_id: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM connect_database WHERE name = ?1",
                        params![database],
                        |row| row.get(0),
                    )
                    .optional()?;
                let database_id = database_id.ok_or_else(|| {
                    HistError::Config(format!(
                        "source connector {:?}: unknown database connector {:?}",
                        connector.name, database
                    ))
                })?;
                tx.execute(
                    "INSERT INTO connect_source_kafka_database (source_id, database_id) VALUES (?1, ?2)",
                    params![id, database_id],
                )?;
            }

            tx.commit()?;
            Ok(id)
        })
    }

    pub fn read_source_connectors(&self) -> Result<Vec<SourceConnector>> {
        self.with_conn(|conn| {
            let mut sources = {
                let mut stmt = conn.prepare(
                    "SELECT id, name, brokers, group_id, schema_prefix \
                     FROM connect_source_kafka ORDER BY id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(SourceConnector {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        brokers: row.get(2)?,
                        group_id: row.get(3)?,
                        schema_prefix: row.get(4)?,
                        ..SourceConnector::default()
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut topics = conn.prepare(
                "SELECT topic FROM connect_source_kafka_topic WHERE source_id = ?1 ORDER BY id",
            )?;
            let mut filters = conn.prepare(
                "SELECT schema_pass_filter FROM connect_source_kafka_schema_pass_filter \
                 WHERE source_id = ?1 ORDER BY id",
            )?;
            let mut databases = conn.prepare(
                "SELECT d.name FROM connect_source_kafka_database k \
                 JOIN connect_database d ON d.id = k.database_id \
                 WHERE k.source_id = ?1 ORDER BY k.id",
            )?;

            for source in &mut sources {
                source.topics = topics
                    .query_map(params![source.id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                source.schema_pass_filter = filters
                    .query_map(params![source.id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                source.databases = databases
                    .query_map(params![source.id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
            }
            Ok(sources)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn warehouse() -> DatabaseConnector {
        DatabaseConnector {
            name: "warehouse".to_string(),
            db_type: "postgresql".to_string(),
            db_host: "db.internal".to_string(),
            db_port: "5432".to_string(),
            db_name: "dw".to_string(),
            db_user: "histdb".to_string(),
            db_password: "secret".to_string(),
            db_ssl_mode: "require".to_string(),
            ..DatabaseConnector::default()
        }
    }

    #[test]
    fn test_database_connectors() {
        let dir = TempDir::new().unwrap();
        let db = SystemCatalog::init_create(dir.path().join("sysdb.sqlite")).unwrap();
        let id = db.insert_database_connector(&warehouse()).unwrap();
        let stored = db.read_database_connectors().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].db_password, "secret");
        assert!(!format!("{:?}", stored[0]).contains("secret"));
        assert!(!serde_json::to_string(&stored[0]).unwrap().contains("secret"));

        // Names are unique.
        assert!(db.insert_database_connector(&warehouse()).is_err());
    }

    #[test]
    fn test_source_connector_with_children() {
        let dir = TempDir::new().unwrap();
        let db = SystemCatalog::init_create(dir.path().join("sysdb.sqlite")).unwrap();
        db.insert_database_connector(&warehouse()).unwrap();

        let source = SourceConnector {
            name: "sensors".to_string(),
            brokers: "kafka:9092".to_string(),
            topics: vec!["^metadb.sensors.".to_string(), "^metadb.meta.".to_string()],
            group_id: "histdb".to_string(),
            schema_pass_filter: vec!["public".to_string()],
            schema_prefix: "s_".to_string(),
            databases: vec!["warehouse".to_string()],
            ..SourceConnector::default()
        };
        let id = db.insert_source_connector(&source).unwrap();

        let stored = db.read_source_connectors().unwrap();
        assert_eq!(stored, vec![SourceConnector { id, ..source }]);
    }

    #[test]
    fn test_source_connector_unknown_database_rolls_back() {
        let dir = TempDir::new().unwrap();
        let db = SystemCatalog::init_create(dir.path().join("sysdb.sqlite")).unwrap();
        let source = SourceConnector {
            name: "orphan".to_string(),
            topics: vec!["t".to_string()],
            databases: vec!["missing".to_string()],
            ..SourceConnector::default()
        };
        let err = db.insert_source_connector(&source).unwrap_err();
        assert!(matches!(err, HistError::Config(_)));
        assert!(db.read_source_connectors().unwrap().is_empty());
    }
}
