//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment environment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Production deployment.
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Application identity section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,

    /// Service name attached to every log line.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "emporio".to_string()
}

/// Server configuration section.
///
/// # Example
///
/// ```
/// use emporio_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:8000".to_string(),
///     shutdown_timeout_secs: 10,
///     request_timeout_ms: 15_000,
/// };
/// assert_eq!(config.request_timeout().as_secs(), 15);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:8000").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    /// Graceful shutdown drain timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Overall per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30_000
}

/// Log severity.
///
/// Parsed case-insensitively; any other value is rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Something unexpected that the service recovered from.
    Warning,
    /// A failed operation.
    Error,
    /// A failure that needs immediate attention.
    Critical,
}

impl LogLevel {
    /// The matching `tracing` level directive.
    ///
    /// `tracing` has no level above `error`, so `CRITICAL` filters the same
    /// as `ERROR`.
    #[must_use]
    pub const fn as_directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(format!(
                "unknown log level '{s}', expected one of DEBUG, INFO, WARNING, ERROR, CRITICAL"
            )),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Minimum severity.
    #[serde(default)]
    pub level: LogLevel,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Log a line when a request enters the pipeline.
    #[serde(default = "default_true")]
    pub log_requests: bool,

    /// Log a line when a response leaves the pipeline.
    #[serde(default = "default_true")]
    pub log_responses: bool,

    /// Reuse a well-formed incoming `X-Request-Id` instead of generating one.
    #[serde(default = "default_true")]
    pub trust_incoming_request_id: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            log_requests: true,
            log_responses: true,
            trust_incoming_request_id: true,
            include_location: false,
        }
    }
}

/// Keycloak realm used to validate bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KeycloakConfig {
    /// Base URL of the Keycloak server.
    #[serde(default = "default_keycloak_url")]
    pub url: String,

    /// Realm name.
    #[serde(default = "default_realm")]
    pub realm: String,

    /// OAuth client id.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// OAuth client secret. Never logged.
    #[serde(default)]
    pub client_secret: String,
}

impl KeycloakConfig {
    fn openid_connect_endpoint(&self, leaf: &str) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/{leaf}",
            self.url.trim_end_matches('/'),
            self.realm
        )
    }

    /// Token issuance endpoint.
    ///
    /// ```
    /// use emporio_config::KeycloakConfig;
    ///
    /// let kc = KeycloakConfig::default();
    /// assert_eq!(
    ///     kc.token_endpoint(),
    ///     "http://localhost:8080/realms/myrealm/protocol/openid-connect/token"
    /// );
    /// ```
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        self.openid_connect_endpoint("token")
    }

    /// Userinfo endpoint used for token validation.
    #[must_use]
    pub fn userinfo_endpoint(&self) -> String {
        self.openid_connect_endpoint("userinfo")
    }

    /// JWKS endpoint.
    #[must_use]
    pub fn certs_endpoint(&self) -> String {
        self.openid_connect_endpoint("certs")
    }
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            url: default_keycloak_url(),
            realm: default_realm(),
            client_id: default_client_id(),
            client_secret: String::new(),
        }
    }
}

fn default_keycloak_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_realm() -> String {
    "myrealm".to_string()
}

fn default_client_id() -> String {
    "myclient".to_string()
}

/// Authentication configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Require a bearer token on non-excluded paths.
    #[serde(default)]
    pub enabled: bool,

    /// Paths that never require authentication. Matched exactly, ignoring a
    /// trailing slash.
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,

    /// Timeout for the userinfo call, in milliseconds.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_ms: u64,

    /// Identity provider settings.
    #[serde(default)]
    pub keycloak: KeycloakConfig,
}

impl AuthConfig {
    /// Identity provider call timeout.
    #[must_use]
    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.provider_timeout_ms)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            excluded_paths: default_excluded_paths(),
            provider_timeout_ms: default_provider_timeout(),
            keycloak: KeycloakConfig::default(),
        }
    }
}

/// Paths excluded from authentication unless configured otherwise.
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &[
    "/health",
    "/v1/health",
    "/ping",
    "/docs",
    "/openapi.json",
    "/redoc",
];

fn default_excluded_paths() -> Vec<String> {
    DEFAULT_EXCLUDED_PATHS
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_provider_timeout() -> u64 {
    5_000
}

/// Database connection pool section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// PostgreSQL DSN. Without one the service starts with no pool.
    #[serde(default)]
    pub dsn: Option<String>,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connections kept open while idle.
    #[serde(default)]
    pub min_connections: u32,

    /// Bounded wait for a free connection, in milliseconds.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,

    /// Close connections idle for longer than this many seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: Option<u64>,

    /// Recycle connections older than this many seconds.
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: Option<u64>,

    /// Ping a connection before handing it out.
    #[serde(default = "default_true")]
    pub test_before_acquire: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            max_connections: default_max_connections(),
            min_connections: 0,
            acquire_timeout_ms: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            test_before_acquire: true,
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5_000
}

#[allow(clippy::unnecessary_wraps)]
fn default_idle_timeout() -> Option<u64> {
    Some(600)
}

#[allow(clippy::unnecessary_wraps)]
fn default_max_lifetime() -> Option<u64> {
    Some(1800)
}

fn default_true() -> bool {
    true
}
