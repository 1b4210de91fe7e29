//! Main configuration types.
//!
//! This module provides the top-level [`EmporioConfig`] struct and its builder.

use serde::{Deserialize, Serialize};

use crate::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, Environment, LogFormat, LogLevel,
    LoggingConfig, ServerConfig,
};

/// Complete Emporio configuration.
///
/// Built once at startup and passed by reference into every component. Use
/// [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use emporio_config::EmporioConfig;
///
/// let config = EmporioConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8000");
/// assert!(!config.auth.enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct EmporioConfig {
    /// Application identity.
    #[serde(default)]
    pub app: AppConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Database pool settings.
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl EmporioConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> EmporioConfigBuilder {
        EmporioConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .server
            .http_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.app.service_name.trim().is_empty() {
            return Err(ConfigError::missing_field("app.service_name"));
        }

        self.validate_auth()?;
        self.validate_database()
    }

    fn validate_auth(&self) -> Result<(), ConfigError> {
        if let Some(path) = self
            .auth
            .excluded_paths
            .iter()
            .find(|p| !p.starts_with('/'))
        {
            return Err(ConfigError::invalid_value(
                "auth.excluded_paths",
                format!("'{path}' must start with '/'"),
            ));
        }

        if self.auth.provider_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "auth.provider_timeout_ms",
                "must be greater than zero",
            ));
        }

        if !self.auth.enabled {
            return Ok(());
        }

        let url = &self.auth.keycloak.url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::invalid_value(
                "auth.keycloak.url",
                format!("expected an http(s) URL, got '{url}'"),
            ));
        }

        if self.auth.keycloak.realm.trim().is_empty() {
            return Err(ConfigError::missing_field("auth.keycloak.realm"));
        }

        if self.auth.keycloak.client_id.trim().is_empty() {
            return Err(ConfigError::missing_field("auth.keycloak.client_id"));
        }

        Ok(())
    }

    fn validate_database(&self) -> Result<(), ConfigError> {
        let db = &self.database;

        if db.max_connections == 0 {
            return Err(ConfigError::invalid_value(
                "database.max_connections",
                "must be greater than zero",
            ));
        }

        if db.min_connections > db.max_connections {
            return Err(ConfigError::invalid_value(
                "database.min_connections",
                format!(
                    "{} exceeds max_connections ({})",
                    db.min_connections, db.max_connections
                ),
            ));
        }

        if db.acquire_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "database.acquire_timeout_ms",
                "must be greater than zero",
            ));
        }

        if let Some(dsn) = &db.dsn {
            if !(dsn.starts_with("postgres://") || dsn.starts_with("postgresql://")) {
                // The DSN carries credentials; report the field, not the value.
                return Err(ConfigError::invalid_value(
                    "database.dsn",
                    "expected a postgres:// or postgresql:// URL",
                ));
            }
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty logs at DEBUG with source locations, auth disabled.
    ///
    /// # Example
    ///
    /// ```
    /// use emporio_config::{EmporioConfig, LogLevel};
    ///
    /// let config = EmporioConfig::development();
    /// assert_eq!(config.logging.level, LogLevel::Debug);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.app.environment = Environment::Development;

        config.logging.level = LogLevel::Debug;
        config.logging.format = LogFormat::Pretty;
        config.logging.include_location = true;

        config.auth.enabled = false;

        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON logs at INFO, auth enabled, incoming request ids ignored.
    ///
    /// # Example
    ///
    /// ```
    /// use emporio_config::{EmporioConfig, LogFormat};
    ///
    /// let config = EmporioConfig::production();
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// assert!(config.auth.enabled);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.app.environment = Environment::Production;

        config.logging.level = LogLevel::Info;
        config.logging.format = LogFormat::Json;
        config.logging.include_location = false;
        config.logging.trust_incoming_request_id = false;

        config.auth.enabled = true;

        config
    }
}

/// Builder for [`EmporioConfig`].
#[derive(Debug, Default)]
pub struct EmporioConfigBuilder {
    app: Option<AppConfig>,
    server: Option<ServerConfig>,
    logging: Option<LoggingConfig>,
    auth: Option<AuthConfig>,
    database: Option<DatabaseConfig>,
}

impl EmporioConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application section.
    #[must_use]
    pub fn app(mut self, app: AppConfig) -> Self {
        self.app = Some(app);
        self
    }

    /// Set the server section.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Set the authentication section.
    #[must_use]
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the database section.
    #[must_use]
    pub fn database(mut self, database: DatabaseConfig) -> Self {
        self.database = Some(database);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> EmporioConfig {
        EmporioConfig {
            app: self.app.unwrap_or_default(),
            server: self.server.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            auth: self.auth.unwrap_or_default(),
            database: self.database.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<EmporioConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeycloakConfig;

    #[test]
    fn test_default_config_is_valid() {
        let config = EmporioConfig::default();
        assert_eq!(config.app.service_name, "emporio");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_server_addr() {
        let result = EmporioConfig::builder()
            .server(ServerConfig {
                http_addr: "not-an-address".to_string(),
                ..Default::default()
            })
            .build_validated();

        assert!(result.unwrap_err().to_string().contains("http_addr"));
    }

    #[test]
    fn test_validate_keycloak_url_only_when_enabled() {
        let auth = AuthConfig {
            enabled: false,
            keycloak: KeycloakConfig {
                url: "keycloak:8080".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(EmporioConfig::builder().auth(auth.clone()).build_validated().is_ok());

        let enabled = AuthConfig {
            enabled: true,
            ..auth
        };
        let err = EmporioConfig::builder()
            .auth(enabled)
            .build_validated()
            .unwrap_err();
        assert!(err.to_string().contains("auth.keycloak.url"));
    }

    #[test]
    fn test_validate_empty_realm() {
        let err = EmporioConfig::builder()
            .auth(AuthConfig {
                enabled: true,
                keycloak: KeycloakConfig {
                    realm: String::new(),
                    ..Default::default()
                },
                ..Default::default()
            })
            .build_validated()
            .unwrap_err();
        assert!(err.to_string().contains("realm"));
    }

    #[test]
    fn test_validate_excluded_path_must_be_absolute() {
        let err = EmporioConfig::builder()
            .auth(AuthConfig {
                excluded_paths: vec!["health".to_string()],
                ..Default::default()
            })
            .build_validated()
            .unwrap_err();
        assert!(err.to_string().contains("excluded_paths"));
    }

    #[test]
    fn test_validate_pool_bounds() {
        let err = EmporioConfig::builder()
            .database(DatabaseConfig {
                max_connections: 2,
                min_connections: 5,
                ..Default::default()
            })
            .build_validated()
            .unwrap_err();
        assert!(err.to_string().contains("min_connections"));

        let err = EmporioConfig::builder()
            .database(DatabaseConfig {
                max_connections: 0,
                ..Default::default()
            })
            .build_validated()
            .unwrap_err();
        assert!(err.to_string().contains("max_connections"));
    }

    #[test]
    fn test_validate_dsn_scheme_without_leaking_it() {
        let err = EmporioConfig::builder()
            .database(DatabaseConfig {
                dsn: Some("mysql://root:hunter2@db/emporio".to_string()),
                ..Default::default()
            })
            .build_validated()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("database.dsn"));
        assert!(!message.contains("hunter2"));

        let ok = EmporioConfig::builder()
            .database(DatabaseConfig {
                dsn: Some("postgresql://app@localhost/emporio".to_string()),
                ..Default::default()
            })
            .build_validated();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_development_preset() {
        let config = EmporioConfig::development();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.auth.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_preset() {
        let config = EmporioConfig::production();
        assert_eq!(config.app.environment, Environment::Production);
        assert!(config.auth.enabled);
        assert!(!config.logging.trust_incoming_request_id);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip_sections() {
        let toml_str = toml::to_string_pretty(&EmporioConfig::default()).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[auth.keycloak]"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml_str = r#"
            [auth]
            enabled = true
            jwks_cache_secs = 60
        "#;

        let result: Result<EmporioConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }
}
