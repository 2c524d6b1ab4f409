//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{HistError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let dest = &config.destination;
    if dest.host.is_empty() {
        return Err(HistError::Config("destination.host is required".into()));
    }
    if dest.database.is_empty() {
        return Err(HistError::Config("destination.database is required".into()));
    }
    if dest.user.is_empty() {
        return Err(HistError::Config("destination.user is required".into()));
    }
    if dest.max_connections == 0 {
        return Err(HistError::Config(
            "destination.max_connections must be at least 1".into(),
        ));
    }
    if dest.statement_timeout_secs == 0 {
        return Err(HistError::Config(
            "destination.statement_timeout_secs must be at least 1".into(),
        ));
    }

    if config.sysdb.path.as_os_str().is_empty() {
        return Err(HistError::Config("sysdb.path must not be empty".into()));
    }

    for role in &config.catalog.grant_roles {
        validate_identifier(role)
            .map_err(|e| HistError::Config(format!("catalog.grant_roles: {}", e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CatalogConfig, DestinationConfig, SysdbConfig};
    use crate::drivers::common::SslMode;

    fn valid_config() -> Config {
        Config {
            destination: DestinationConfig {
                name: "warehouse".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                database: "warehouse".to_string(),
                user: "histdb".to_string(),
                password: "password".to_string(),
                ssl_mode: SslMode::Disable,
                max_connections: 4,
                statement_timeout_secs: 300,
            },
            sysdb: SysdbConfig::default(),
            catalog: CatalogConfig {
                grant_roles: vec!["analyst".to_string()],
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.destination.host = String::new();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("destination.host"));
    }

    #[test]
    fn test_missing_database_and_user() {
        let mut config = valid_config();
        config.destination.database = String::new();
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.destination.user = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = valid_config();
        config.destination.max_connections = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.destination.statement_timeout_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_role_rejected() {
        let mut config = valid_config();
        config.catalog.grant_roles.push(String::new());
        assert!(matches!(validate(&config), Err(HistError::Config(_))));
    }
}
