//! Error types for catalog, DDL and system catalog operations.

use std::time::Duration;

use thiserror::Error;

/// Main error type for schema evolution operations.
#[derive(Error, Debug)]
pub enum HistError {
    /// Configuration error (invalid YAML, malformed timestamp, reserved or invalid names).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A statement failed on the destination database.
    #[error("{destination}: {message}\n  SQL: {statement}")]
    Destination {
        destination: String,
        statement: String,
        message: String,
    },

    /// A statement did not complete within the configured timeout.
    #[error("{destination}: statement timed out after {}s\n  SQL: {statement}", .after.as_secs())]
    Timeout {
        destination: String,
        statement: String,
        after: Duration,
    },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Catalog state does not allow the requested operation.
    #[error("Catalog consistency error: {0}")]
    Consistency(String),

    /// The system catalog file is held by another process.
    #[error("System catalog is locked: {0}")]
    LockContention(String),

    /// System catalog (SQLite) error
    #[error("System catalog error: {0}")]
    Sysdb(#[from] rusqlite::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

impl HistError {
    /// Create a Destination error carrying the failed statement text.
    pub fn destination(
        destination: impl Into<String>,
        statement: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        HistError::Destination {
            destination: destination.into(),
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        HistError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Whether the process must stop rather than reject the current event.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HistError::Consistency(_) | HistError::LockContention(_))
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            HistError::Config(_) | HistError::Yaml(_) => 2,
            HistError::Destination { .. }
            | HistError::Timeout { .. }
            | HistError::Pool { .. }
            | HistError::Cancelled => 3,
            HistError::Consistency(_) | HistError::LockContention(_) => 4,
            HistError::Sysdb(_) | HistError::Io(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for histdb operations.
pub type Result<T> = std::result::Result<T, HistError>;
