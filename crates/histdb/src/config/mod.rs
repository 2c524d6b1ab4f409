//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::common::SslMode;
    use std::path::PathBuf;

    #[test]
    fn test_from_yaml_defaults() {
        let config = Config::from_yaml(
            r#"
destination:
  host: db.internal
  database: warehouse
  user: histdb
  password: secret
"#,
        )
        .unwrap();
        assert_eq!(config.destination.port, 5432);
        assert_eq!(config.destination.ssl_mode, SslMode::Require);
        assert_eq!(config.destination.max_connections, 4);
        assert_eq!(config.destination.statement_timeout_secs, 300);
        assert_eq!(config.destination.display_name(), "warehouse");
        assert_eq!(config.sysdb.path, PathBuf::from("histdb.sqlite"));
        assert!(config.catalog.grant_roles.is_empty());
    }

    #[test]
    fn test_from_yaml_full() {
        let config = Config::from_yaml(
            r#"
destination:
  name: dw
  host: db.internal
  port: 6432
  database: warehouse
  user: histdb
  password: secret
  ssl_mode: verify-full
  max_connections: 8
  statement_timeout_secs: 60
sysdb:
  path: /var/lib/histdb/sysdb.sqlite
catalog:
  grant_roles: [analyst, "report ing"]
"#,
        )
        .unwrap();
        assert_eq!(config.destination.display_name(), "dw");
        assert_eq!(config.destination.ssl_mode, SslMode::VerifyFull);
        assert_eq!(config.catalog.grant_roles.len(), 2);
    }

    #[test]
    fn test_invalid_ssl_mode_rejected() {
        let result = Config::from_yaml(
            r#"
destination:
  host: h
  database: d
  user: u
  ssl_mode: sometimes
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_password_never_serialized() {
        let config = Config::from_yaml(
            r#"
destination:
  host: h
  database: d
  user: u
  password: hunter2
"#,
        )
        .unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("hunter2"));
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/histdb.yaml").unwrap_err();
        assert!(matches!(err, crate::error::HistError::Io(_)));
    }
}
