//! Error types for Emporio.
//!
//! [`AppError`] is the error type handlers and framework layers return. Each
//! variant belongs to an [`ErrorCategory`] which decides the HTTP status and
//! whether the message may be shown to the caller.
//!
//! | Category | Status | Message exposed |
//! |---|---|---|
//! | `Validation` | 400 | yes |
//! | `Authentication` | 401 | yes |
//! | `NotFound` | 404 | yes |
//! | `MethodNotAllowed` | 405 | yes |
//! | `Unavailable` | 503 | yes |
//! | `Timeout` | 504 | yes |
//! | `Configuration` | 500 | no |
//! | `Data` | 500 | no |
//! | `Internal` | 500 | no |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`AppError`].
pub type AppResult<T> = Result<T, AppError>;

/// Message shown to callers in place of any server-side error detail.
pub const GENERIC_INTERNAL_MESSAGE: &str = "Internal Server Error";

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid input from the caller.
    Validation,
    /// Missing or rejected credentials.
    Authentication,
    /// Unknown resource or route.
    NotFound,
    /// Known route, wrong method.
    MethodNotAllowed,
    /// A shared resource (the connection pool) is exhausted; retryable.
    Unavailable,
    /// The request took longer than the server allows.
    Timeout,
    /// Missing or invalid settings, or a wiring bug.
    Configuration,
    /// Query, commit or connectivity failure in the data layer.
    Data,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Configuration | Self::Data | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether errors of this category originate on the server side.
    ///
    /// Server-side errors never expose their message to callers.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        matches!(self, Self::Configuration | Self::Data | Self::Internal)
    }
}

/// Standard error type for Emporio.
///
/// # Example
///
/// ```
/// use emporio_core::{AppError, ErrorCategory};
///
/// fn parse_item_id(raw: &str) -> Result<i64, AppError> {
///     raw.parse()
///         .map_err(|_| AppError::validation(format!("item_id must be an integer, got '{raw}'")))
/// }
///
/// let err = parse_item_id("abc").unwrap_err();
/// assert_eq!(err.category(), ErrorCategory::Validation);
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Request validation failed.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Path exists but not for this method.
    #[error("Method not allowed: {method}")]
    MethodNotAllowed {
        /// The rejected method.
        method: String,
    },

    /// A shared resource is temporarily exhausted.
    #[error("Service unavailable: {message}")]
    Unavailable {
        /// Human-readable error message.
        message: String,
        /// Seconds the caller should wait before retrying.
        retry_after_seconds: Option<u64>,
    },

    /// Request exceeded the server's time budget.
    #[error("Timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// Invalid settings or a missing request-scoped binding.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the wiring problem (server-side only).
        message: String,
    },

    /// Data-layer failure.
    #[error("Data error: {message}")]
    Data {
        /// Description of the failure (server-side only).
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Internal server error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure (server-side only).
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl AppError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a method-not-allowed error.
    #[must_use]
    pub fn method_not_allowed(method: impl Into<String>) -> Self {
        Self::MethodNotAllowed {
            method: method.into(),
        }
    }

    /// Creates a retryable service-unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>, retry_after_seconds: Option<u64>) -> Self {
        Self::Unavailable {
            message: message.into(),
            retry_after_seconds,
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a data-layer error.
    #[must_use]
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a data-layer error with a source error.
    pub fn data_with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Data {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::MethodNotAllowed { .. } => ErrorCategory::MethodNotAllowed,
            Self::Unavailable { .. } => ErrorCategory::Unavailable,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Data { .. } => ErrorCategory::Data,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns `true` for errors that must be logged in full and hidden from
    /// the caller.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        self.category().is_server_side()
    }

    /// Seconds to advertise in a `Retry-After` header, if any.
    #[must_use]
    pub const fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Unavailable {
                retry_after_seconds,
                ..
            } => *retry_after_seconds,
            _ => None,
        }
    }

    /// Full error chain for server-side logs.
    #[must_use]
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            detail.push_str(": ");
            detail.push_str(&err.to_string());
            source = err.source();
        }
        detail
    }

    /// Converts this error to a serializable error envelope.
    ///
    /// Server-side categories carry [`GENERIC_INTERNAL_MESSAGE`] instead of
    /// their own message.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        let message = if self.is_server_side() {
            GENERIC_INTERNAL_MESSAGE.to_string()
        } else {
            self.public_message()
        };

        ErrorEnvelope {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message,
                category: self.category(),
                details: self.error_details(),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Authentication { .. } => "UNAUTHORIZED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            Self::Unavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Configuration { .. } | Self::Data { .. } | Self::Internal { .. } => {
                "INTERNAL_ERROR"
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Validation { message }
            | Self::Authentication { message }
            | Self::NotFound { message }
            | Self::Unavailable { message, .. }
            | Self::Timeout { message } => message.clone(),
            Self::MethodNotAllowed { method } => format!("Method {method} not allowed"),
            _ => GENERIC_INTERNAL_MESSAGE.to_string(),
        }
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Unavailable {
                retry_after_seconds: Some(seconds),
                ..
            } => Some(serde_json::json!({ "retry_after_seconds": seconds })),
            _ => None,
        }
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let error = AppError::validation("phoneNumber is required");
        assert_eq!(error.category(), ErrorCategory::Validation);
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert!(!error.is_server_side());
    }

    #[test]
    fn test_unavailable_carries_retry_after() {
        let error = AppError::unavailable("connection pool exhausted", Some(1));
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.retry_after_seconds(), Some(1));

        let envelope = error.to_envelope(None);
        assert_eq!(envelope.error.code, "SERVICE_UNAVAILABLE");
        assert_eq!(envelope.error.details.unwrap()["retry_after_seconds"], 1);
    }

    #[test]
    fn test_server_side_message_hidden() {
        let error = AppError::data_with_source(
            "insert into app_user failed",
            anyhow::anyhow!("relation \"app_user\" does not exist"),
        );
        assert!(error.is_server_side());

        let envelope = error.to_envelope(Some("req-1"));
        assert_eq!(envelope.error.message, GENERIC_INTERNAL_MESSAGE);
        assert_eq!(envelope.error.code, "INTERNAL_ERROR");
        assert!(!serde_json::to_string(&envelope).unwrap().contains("app_user"));
    }

    #[test]
    fn test_detail_includes_source_chain() {
        let error = AppError::internal_with_source("boom", anyhow::anyhow!("root cause"));
        let detail = error.detail();
        assert!(detail.contains("boom"));
        assert!(detail.contains("root cause"));
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = AppError::not_found("No route for /nope").to_envelope(Some("req-456"));
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"code\":\"NOT_FOUND\""));
        assert!(json.contains("\"request_id\":\"req-456\""));
        assert!(json.contains("\"category\":\"not_found\""));
    }

    #[test]
    fn test_all_categories_map_to_error_status() {
        let categories = [
            ErrorCategory::Validation,
            ErrorCategory::Authentication,
            ErrorCategory::NotFound,
            ErrorCategory::MethodNotAllowed,
            ErrorCategory::Unavailable,
            ErrorCategory::Timeout,
            ErrorCategory::Configuration,
            ErrorCategory::Data,
            ErrorCategory::Internal,
        ];

        for category in categories {
            let status = category.default_status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "Category {:?} should map to error status code, got {}",
                category,
                status
            );
        }
    }
}
