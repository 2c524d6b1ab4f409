//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::common::SslMode;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination warehouse (PostgreSQL).
    pub destination: DestinationConfig,

    /// Local system catalog.
    #[serde(default)]
    pub sysdb: SysdbConfig,

    /// Catalog behavior.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Destination database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Name used in logs and error messages (default: database name).
    #[serde(default)]
    pub name: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never written back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// SSL mode (default: require).
    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Upper bound on a single statement or batch, in seconds (default: 300).
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

impl DestinationConfig {
    /// Name reported in destination errors.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.database
        } else {
            &self.name
        }
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .finish()
    }
}

/// System catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysdbConfig {
    /// Path of the SQLite file (default: histdb.sqlite).
    #[serde(default = "default_sysdb_path")]
    pub path: PathBuf,
}

impl Default for SysdbConfig {
    fn default() -> Self {
        Self {
            path: default_sysdb_path(),
        }
    }
}

/// Catalog behavior configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Roles granted schema usage and read access on every created table.
    #[serde(default)]
    pub grant_roles: Vec<String>,
}

// Default value functions for serde
fn default_pg_port() -> u16 {
    5432
}

fn default_max_connections() -> usize {
    4
}

fn default_statement_timeout_secs() -> u64 {
    300
}

fn default_sysdb_path() -> PathBuf {
    PathBuf::from("histdb.sqlite")
}
