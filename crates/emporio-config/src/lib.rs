//! Typed configuration for Emporio.
//!
//! Settings are loaded once at startup into an [`EmporioConfig`] and passed
//! by reference into every component:
//!
//! - [`AppConfig`] - environment and service name
//! - [`ServerConfig`] - bind address and timeouts
//! - [`LoggingConfig`] - severity, format, request/response logging toggles
//! - [`AuthConfig`] - bearer authentication and the Keycloak realm
//! - [`DatabaseConfig`] - PostgreSQL DSN and pool sizing
//!
//! Unknown fields are rejected, and [`ConfigLoader::load`] validates the
//! result before returning it.
//!
//! # Example
//!
//! ```no_run
//! use emporio_config::ConfigLoader;
//!
//! # fn main() -> Result<(), emporio_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("emporio.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix("EMPORIO")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variable Overrides
//!
//! Every setting can be overridden with `EMPORIO__SECTION__KEY`:
//!
//! - `EMPORIO__AUTH__ENABLED=true`
//! - `EMPORIO__AUTH__KEYCLOAK__URL=https://sso.example.com`
//! - `EMPORIO__AUTH__EXCLUDED_PATHS=/health,/ping`
//! - `EMPORIO__LOGGING__LEVEL=WARNING`
//! - `EMPORIO__DATABASE__DSN=postgres://app@db/emporio`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{EmporioConfig, EmporioConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
