//! # Emporio
//!
//! The Emporio backend service. Composes the settings, database pool,
//! Keycloak token validation and the fixed middleware pipeline around the
//! application routes:
//!
//! ```text
//! Request -> ExceptionBoundary -> Logging -> Authentication -> Session -> Handler
//! ```
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use emporio::Application;
//! use emporio_config::EmporioConfig;
//! use emporio_datastore::SessionManager;
//! use emporio_middleware::StaticProvider;
//!
//! let app = Application::compose(
//!     &EmporioConfig::default(),
//!     Arc::new(StaticProvider::new()),
//!     Arc::new(SessionManager::new()),
//! );
//! assert_eq!(
//!     app.server().pipeline().stage_names(),
//!     vec!["exception_boundary", "logging", "authentication", "session"]
//! );
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
mod error;
pub mod routes;

pub use app::{pool_config, Application};
pub use error::BootstrapError;
