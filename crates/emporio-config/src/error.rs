//! Settings errors. All of them are fatal at startup.

use std::path::PathBuf;
use thiserror::Error;

/// Why settings could not be loaded or accepted.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML or an unknown key.
    #[error("invalid TOML settings: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON or an unknown key.
    #[error("invalid JSON settings: {0}")]
    Json(#[from] serde_json::Error),

    /// A setting has an unusable value.
    #[error("{field}: {reason}")]
    Invalid {
        /// Dotted setting path, e.g. `auth.keycloak.url`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A required setting is empty.
    #[error("{field} is required")]
    Missing {
        /// Dotted setting path.
        field: String,
    },

    /// An environment override does not parse.
    #[error("environment variable {var}: {reason}")]
    Env {
        /// Variable name.
        var: String,
        /// Parse failure.
        reason: String,
    },

    /// A `.env` file is present but unreadable.
    #[error(".env: {0}")]
    Dotenv(String),

    /// Anything else rejected while loading.
    #[error("{0}")]
    Validation(String),
}

impl ConfigError {
    /// [`ConfigError::NotFound`].
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// [`ConfigError::Read`].
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// [`ConfigError::Invalid`].
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// [`ConfigError::Missing`].
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::Missing {
            field: field.into(),
        }
    }

    /// [`ConfigError::Env`].
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// [`ConfigError::Validation`].
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
