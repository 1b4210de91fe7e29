//! Startup errors.

use emporio_config::ConfigError;
use emporio_datastore::DatastoreError;
use emporio_middleware::ProviderError;
use emporio_server::ServerError;
use emporio_telemetry::TelemetryError;
use thiserror::Error;

/// Anything that stops the service from starting or serving.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Settings could not be loaded or failed validation.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be initialised.
    #[error("telemetry: {0}")]
    Telemetry(#[from] TelemetryError),

    /// The database pool could not be created.
    #[error("database: {0}")]
    Datastore(#[from] DatastoreError),

    /// The identity provider client could not be built.
    #[error("identity provider: {0}")]
    Provider(#[from] ProviderError),

    /// The server failed to bind or serve.
    #[error("server: {0}")]
    Server(#[from] ServerError),
}
