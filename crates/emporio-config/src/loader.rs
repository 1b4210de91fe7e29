//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, `.env` and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, EmporioConfig, Environment, LogFormat, LogLevel};

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (or a preset)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables, optionally seeded from a `.env` file
///
/// # Example
///
/// ```no_run
/// use emporio_config::ConfigLoader;
///
/// # fn main() -> Result<(), emporio_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("emporio.toml")?
///     .with_dotenv()?
///     .with_env_prefix("EMPORIO")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: EmporioConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EmporioConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = EmporioConfig::default();
        self
    }

    /// Start with the development preset.
    ///
    /// ```
    /// use emporio_config::{ConfigLoader, LogLevel};
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, LogLevel::Debug);
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = EmporioConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = EmporioConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format (TOML or JSON) is chosen by file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use emporio_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [auth]
    ///     enabled = true
    ///
    ///     [auth.keycloak]
    ///     realm = "shop"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.auth.keycloak.realm, "shop");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, e.g.
    /// `EMPORIO__AUTH__ENABLED=true` or `EMPORIO__AUTH__KEYCLOAK__REALM=shop`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file from the working directory into the process
    /// environment. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file exists but cannot be
    /// parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e.to_string())),
        }
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(mut self) -> Result<EmporioConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> EmporioConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<EmporioConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(key_without_prefix) = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
        else {
            // Shares the prefix but not the separator, e.g. EMPORIO_HOME.
            return Ok(());
        };

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            // App section
            ["APP", "ENVIRONMENT"] => {
                config.app.environment = match value.to_lowercase().as_str() {
                    "development" | "dev" => Environment::Development,
                    "production" | "prod" => Environment::Production,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'development' or 'production'",
                        ))
                    }
                };
            }
            ["APP", "SERVICE_NAME"] => {
                config.app.service_name = value.to_string();
            }

            // Server section
            ["SERVER", "HTTP_ADDR"] => {
                config.server.http_addr = value.to_string();
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_int(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_int(key, value)?;
            }

            // Logging section
            ["LOGGING", "LEVEL"] => {
                config.logging.level = value
                    .parse::<LogLevel>()
                    .map_err(|reason| ConfigError::env_parse_error(key, reason))?;
            }
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "LOG_REQUESTS"] => {
                config.logging.log_requests = parse_flag(key, value)?;
            }
            ["LOGGING", "LOG_RESPONSES"] => {
                config.logging.log_responses = parse_flag(key, value)?;
            }
            ["LOGGING", "TRUST_INCOMING_REQUEST_ID"] => {
                config.logging.trust_incoming_request_id = parse_flag(key, value)?;
            }
            ["LOGGING", "INCLUDE_LOCATION"] => {
                config.logging.include_location = parse_flag(key, value)?;
            }

            // Auth section
            ["AUTH", "ENABLED"] => {
                config.auth.enabled = parse_flag(key, value)?;
            }
            ["AUTH", "EXCLUDED_PATHS"] => {
                config.auth.excluded_paths = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(ToString::to_string)
                    .collect();
            }
            ["AUTH", "PROVIDER_TIMEOUT_MS"] => {
                config.auth.provider_timeout_ms = parse_int(key, value)?;
            }
            ["AUTH", "KEYCLOAK", "URL"] => {
                config.auth.keycloak.url = value.to_string();
            }
            ["AUTH", "KEYCLOAK", "REALM"] => {
                config.auth.keycloak.realm = value.to_string();
            }
            ["AUTH", "KEYCLOAK", "CLIENT_ID"] => {
                config.auth.keycloak.client_id = value.to_string();
            }
            ["AUTH", "KEYCLOAK", "CLIENT_SECRET"] => {
                config.auth.keycloak.client_secret = value.to_string();
            }

            // Database section
            ["DATABASE", "DSN"] => {
                config.database.dsn = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            ["DATABASE", "MAX_CONNECTIONS"] => {
                config.database.max_connections = parse_int(key, value)?;
            }
            ["DATABASE", "MIN_CONNECTIONS"] => {
                config.database.min_connections = parse_int(key, value)?;
            }
            ["DATABASE", "ACQUIRE_TIMEOUT_MS"] => {
                config.database.acquire_timeout_ms = parse_int(key, value)?;
            }
            ["DATABASE", "IDLE_TIMEOUT_SECS"] => {
                config.database.idle_timeout_secs = parse_optional_int(key, value)?;
            }
            ["DATABASE", "MAX_LIFETIME_SECS"] => {
                config.database.max_lifetime_secs = parse_optional_int(key, value)?;
            }
            ["DATABASE", "TEST_BEFORE_ACQUIRE"] => {
                config.database.test_before_acquire = parse_flag(key, value)?;
            }

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_optional_int(key: &str, value: &str) -> Result<Option<u64>, ConfigError> {
    if value.eq_ignore_ascii_case("none") || value.is_empty() {
        Ok(None)
    } else {
        parse_int(key, value).map(Some)
    }
}
