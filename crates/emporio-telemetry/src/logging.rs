//! Structured logging for Emporio.
//!
//! Logs go to stdout through `tracing-subscriber`: JSON in production,
//! pretty-printed in development. Every line emitted inside a request's
//! span carries that request's `request_id`.
//!
//! # Example
//!
//! ```rust,ignore
//! use emporio_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::from_settings(&config))?;
//!
//! tracing::info!(environment = %config.app.environment, "Starting emporio");
//! ```

use emporio_config::{EmporioConfig, Environment, LogFormat};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Dependencies that log too much at the application's level.
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest", "sqlx"];

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Application log level directive ("debug", "info", "warn", "error").
    pub level: String,

    /// Whether to output JSON format.
    pub json_format: bool,

    /// Whether to include span events (new, close).
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include thread IDs.
    pub thread_ids: bool,

    /// Whether to include target (module path).
    pub include_target: bool,

    /// Service name reported when logging starts.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            thread_ids: false,
            include_target: true,
            service_name: "emporio".to_string(),
        }
    }
}

impl LogConfig {
    /// Derives the logging setup from loaded settings.
    ///
    /// Span open/close events are only emitted in development.
    #[must_use]
    pub fn from_settings(config: &EmporioConfig) -> Self {
        Self {
            enabled: true,
            level: config.logging.level.as_directive().to_string(),
            json_format: config.logging.format == LogFormat::Json,
            span_events: config.app.environment == Environment::Development
                && config.logging.format == LogFormat::Pretty,
            file_line_info: config.logging.include_location,
            thread_ids: false,
            include_target: true,
            service_name: config.app.service_name.clone(),
        }
    }

    /// Filter directive: the application level plus `warn` for noisy
    /// dependencies, unless the application level is already stricter.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        let mut directive = self.level.clone();
        if matches!(self.level.as_str(), "trace" | "debug" | "info") {
            for dependency in QUIET_DEPENDENCIES {
                directive.push_str(&format!(",{dependency}=warn"));
            }
        }
        directive
    }
}

/// Initializes the logging subsystem.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the level is not a valid filter
/// or a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.filter_directive())?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::debug!(service.name = %config.service_name, "Logging initialized");

    Ok(())
}

/// Creates an env filter from a string.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` if the directive does not parse.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|e| TelemetryError::InvalidFilter {
        directive: filter.to_string(),
        reason: e.to_string(),
    })
}

/// Standard log fields for Emporio.
///
/// Use these field names for consistency across logs.
pub mod fields {
    /// Request ID field name.
    pub const REQUEST_ID: &str = "request_id";

    /// Operation ID field name.
    pub const OPERATION_ID: &str = "operation_id";

    /// HTTP method field name.
    pub const HTTP_METHOD: &str = "http.method";

    /// HTTP path field name.
    pub const HTTP_PATH: &str = "http.path";

    /// HTTP status code field name.
    pub const HTTP_STATUS: &str = "http.status_code";

    /// Duration field name (in milliseconds).
    pub const DURATION_MS: &str = "duration_ms";

    /// Error field name.
    pub const ERROR: &str = "error";

    /// User ID field name.
    pub const USER_ID: &str = "user_id";

    /// Service name field name.
    pub const SERVICE_NAME: &str = "service.name";
}

/// Logs a request start event.
#[macro_export]
macro_rules! log_request_start {
    ($request_id:expr, $method:expr, $path:expr) => {
        tracing::info!(
            request_id = %$request_id,
            http.method = %$method,
            http.path = %$path,
            "Request started"
        );
    };
}

/// Logs a request completion event.
#[macro_export]
macro_rules! log_request_complete {
    ($request_id:expr, $status:expr, $duration_ms:expr) => {
        tracing::info!(
            request_id = %$request_id,
            http.status_code = $status,
            duration_ms = $duration_ms,
            "Request completed"
        );
    };
}

/// Logs a request that unwound without producing a response.
#[macro_export]
macro_rules! log_request_failed {
    ($request_id:expr, $duration_ms:expr, $error:expr) => {
        tracing::error!(
            request_id = %$request_id,
            duration_ms = $duration_ms,
            error = %$error,
            "Request failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use emporio_config::LogLevel;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert!(config.json_format);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_from_development_settings() {
        let config = LogConfig::from_settings(&EmporioConfig::development());
        assert!(!config.json_format);
        assert!(config.span_events);
        assert!(config.file_line_info);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_from_production_settings() {
        let config = LogConfig::from_settings(&EmporioConfig::production());
        assert!(config.json_format);
        assert!(!config.span_events);
        assert_eq!(config.service_name, "emporio");
    }

    #[test]
    fn test_warning_maps_to_warn_directive() {
        let mut settings = EmporioConfig::default();
        settings.logging.level = LogLevel::Warning;
        let config = LogConfig::from_settings(&settings);
        assert_eq!(config.filter_directive(), "warn");
    }

    #[test]
    fn test_filter_directive_quiets_dependencies() {
        let directive = LogConfig::default().filter_directive();
        assert!(directive.starts_with("info,"));
        assert!(directive.contains("sqlx=warn"));
        assert!(directive.contains("reqwest=warn"));
        assert!(create_env_filter(&directive).is_ok());
    }

    #[test]
    fn test_create_env_filter_invalid() {
        let err = create_env_filter("info,sqlx=loud").unwrap_err();
        assert!(err.to_string().contains("sqlx=loud"));
    }

    #[test]
    fn test_disabled_logging() {
        let config = LogConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
