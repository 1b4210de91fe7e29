//! Structured logging for Emporio.
//!
//! - [`init_logging`] installs the global `tracing` subscriber once at startup
//! - [`logging::fields`] holds the standard field names
//! - [`log_request_start!`], [`log_request_complete!`] and
//!   [`log_request_failed!`] are used by the request logging stage
//!
//! # Example
//!
//! ```rust,ignore
//! use emporio_config::EmporioConfig;
//! use emporio_telemetry::{init_logging, LogConfig};
//!
//! let settings = EmporioConfig::development();
//! init_logging(&LogConfig::from_settings(&settings))?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
