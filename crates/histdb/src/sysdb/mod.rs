//! Durable local system catalog (SQLite).
//!
//! The store holds connector configuration and a mirror of the tracked
//! relations and attributes. It also owns the mutual exclusion that allows a
//! single process per catalog file:
//!
//! - Every open sets `locking_mode=EXCLUSIVE` and writes the `lock_db` row.
//!   SQLite then keeps the file's exclusive lock until the connection closes,
//!   so a second process fails at that write.
//! - Within one process, a registry of open catalog files serializes the
//!   initialization sequence and rejects a second handle for the same file.

mod connectors;
mod mirror;

pub use connectors::{DatabaseConnector, SourceConnector};
pub use mirror::RelationRecord;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, TryLockError};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OpenFlags};
use tracing::{info, warn};

use crate::error::{HistError, Result};

/// Version stamped into `PRAGMA user_version` at creation.
pub const SCHEMA_VERSION: i64 = 1;

const PRAGMAS: &str = "PRAGMA foreign_keys = ON;
PRAGMA journal_mode = DELETE;
PRAGMA locking_mode = EXCLUSIVE;
PRAGMA synchronous = EXTRA;";

const SCHEMA: &str = "
CREATE TABLE lock_db (
    b BOOLEAN
);
INSERT INTO lock_db (b) VALUES (TRUE);
CREATE TABLE connect_database (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    type TEXT NOT NULL,
    dbhost TEXT NOT NULL,
    dbport TEXT NOT NULL,
    dbname TEXT NOT NULL,
    dbuser TEXT NOT NULL,
    dbpassword TEXT NOT NULL,
    dbsslmode TEXT NOT NULL
);
CREATE TABLE connect_source_kafka (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    brokers TEXT NOT NULL,
    group_id TEXT NOT NULL,
    schema_prefix TEXT NOT NULL
);
CREATE TABLE connect_source_kafka_topic (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL REFERENCES connect_source_kafka (id),
    topic TEXT NOT NULL
);
CREATE TABLE connect_source_kafka_schema_pass_filter (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL REFERENCES connect_source_kafka (id),
    schema_pass_filter TEXT NOT NULL
);
CREATE TABLE connect_source_kafka_database (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL REFERENCES connect_source_kafka (id),
    database_id INTEGER NOT NULL REFERENCES connect_database (id)
);
CREATE TABLE relation (
    rel_schema TEXT,
    rel_name TEXT,
    transformed BOOLEAN NOT NULL DEFAULT FALSE,
    parent_schema TEXT NOT NULL DEFAULT '',
    parent_name TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (rel_schema, rel_name)
);
CREATE TABLE attribute (
    rel_schema TEXT,
    rel_name TEXT,
    attr_name TEXT,
    attr_type TEXT,
    attr_type_size BIGINT,
    pkey SMALLINT,
    PRIMARY KEY (rel_schema, rel_name, attr_name)
);";

/// Lifecycle of a catalog file within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysdbState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Catalog files with a live handle in this process. Held for the whole
/// init sequence.
fn registry() -> &'static Mutex<HashMap<PathBuf, SysdbState>> {
    static OPEN: OnceLock<Mutex<HashMap<PathBuf, SysdbState>>> = OnceLock::new();
    OPEN.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_registry() -> MutexGuard<'static, HashMap<PathBuf, SysdbState>> {
    registry().lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State of the catalog file at `path` as seen by this process.
pub fn state_of(path: &Path) -> SysdbState {
    let Ok(key) = std::fs::canonicalize(path) else {
        return SysdbState::Uninitialized;
    };
    match registry().try_lock() {
        Ok(open) => open.get(&key).copied().unwrap_or(SysdbState::Uninitialized),
        Err(TryLockError::WouldBlock) => SysdbState::Initializing,
        Err(TryLockError::Poisoned(poisoned)) => poisoned
            .into_inner()
            .get(&key)
            .copied()
            .unwrap_or(SysdbState::Uninitialized),
    }
}

/// Handle to an open system catalog.
///
/// Closing or dropping the handle releases the file's registration and its
/// exclusive lock.
pub struct SystemCatalog {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SystemCatalog {
    /// Open an existing catalog file.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        Self::initialize(path.as_ref(), false)
    }

    /// Create a new catalog file, then open it.
    ///
    /// Fails without touching anything if `path` already exists.
    pub fn init_create(path: impl AsRef<Path>) -> Result<Self> {
        Self::initialize(path.as_ref(), true)
    }

    fn initialize(path: &Path, create: bool) -> Result<Self> {
        let mut open = lock_registry();

        if create {
            if path.exists() {
                return Err(HistError::Config(format!(
                    "creating system catalog: {} already exists",
                    path.display()
                )));
            }
            create_store(path)?;
        } else if !path.exists() {
            return Err(HistError::Config(format!(
                "system catalog {} does not exist; run init-sysdb first",
                path.display()
            )));
        }

        let key = std::fs::canonicalize(path)?;
        if open.contains_key(&key) {
            return Err(HistError::Consistency(format!(
                "initializing system catalog {}: already initialized",
                key.display()
            )));
        }

        open.insert(key.clone(), SysdbState::Initializing);
        let conn = match open_store(&key) {
            Ok(conn) => conn,
            Err(e) => {
                open.remove(&key);
                return Err(e);
            }
        };
        open.insert(key.clone(), SysdbState::Ready);

        info!("Opened system catalog {}", key.display());
        Ok(Self {
            path: key,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Canonical path of the catalog file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> SysdbState {
        match self.conn.lock() {
            Ok(conn) if conn.is_some() => SysdbState::Ready,
            _ => SysdbState::Closed,
        }
    }

    /// Schema version recorded in the file.
    pub fn schema_version(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?))
    }

    /// Close the store and release the file.
    pub fn close(&self) -> Result<()> {
        let taken = self
            .conn
            .lock()
            .map_err(|_| HistError::Consistency("system catalog handle poisoned".into()))?
            .take();
        let Some(conn) = taken else {
            return Ok(());
        };
        // The file lock is released with the connection; unregister after.
        let closed = conn.close().map_err(|(_, e)| HistError::Sysdb(e));
        lock_registry().remove(&self.path);
        closed?;
        info!("Closed system catalog {}", self.path.display());
        Ok(())
    }

    /// Run `f` with the connection, failing once the handle is closed.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| HistError::Consistency("system catalog handle poisoned".into()))?;
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(HistError::Consistency(format!(
                "system catalog {} is closed",
                self.path.display()
            ))),
        }
    }
}

impl Drop for SystemCatalog {
    fn drop(&mut self) {
        let conn = match self.conn.get_mut() {
            Ok(conn) => conn.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(conn) = conn {
            drop(conn);
            lock_registry().remove(&self.path);
        }
    }
}

impl std::fmt::Debug for SystemCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemCatalog")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

/// Create the file and its schema in one transaction, then restrict it to
/// the owner.
fn create_store(path: &Path) -> Result<()> {
    let result = (|| -> Result<()> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        let tx = conn.transaction()?;
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tx.execute_batch(SCHEMA)?;
        tx.commit()?;
        conn.close().map_err(|(_, e)| HistError::Sysdb(e))?;
        restrict_permissions(path)
    })();

    if let Err(e) = result {
        if let Err(remove) = std::fs::remove_file(path) {
            warn!(
                "could not remove partially created system catalog {}: {}",
                path.display(),
                remove
            );
        }
        return Err(e);
    }
    info!("Created system catalog {} (schema version {})", path.display(), SCHEMA_VERSION);
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Open with the durability pragmas, take the exclusive lock and check the
/// schema version.
fn open_store(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(Duration::ZERO)?;
    conn.execute_batch(PRAGMAS)
        .map_err(|e| lock_error(e, path))?;
    conn.execute("UPDATE lock_db SET b = TRUE", [])
        .map_err(|e| lock_error(e, path))?;

    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version != SCHEMA_VERSION {
        return Err(HistError::Consistency(format!(
            "system catalog {} has schema version {}, expected {}",
            path.display(),
            version,
            SCHEMA_VERSION
        )));
    }
    Ok(conn)
}

fn lock_error(err: rusqlite::Error, path: &Path) -> HistError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            HistError::LockContention(format!(
                "{} is in use by another process",
                path.display()
            ))
        }
        _ => HistError::Sysdb(err),
    }
}
