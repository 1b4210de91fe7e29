//! Composition of config, pool, identity provider, pipeline and routes.

use std::sync::Arc;
use std::time::Duration;

use emporio_config::{DatabaseConfig, EmporioConfig};
use emporio_datastore::{PoolConfig, SessionManager};
use emporio_middleware::{
    AuthenticationStage, IdentityProvider, KeycloakProvider, LoggingStage, Pipeline, Request,
    Response, StaticProvider,
};
use emporio_server::Server;

use crate::error::BootstrapError;
use crate::routes::{self, AppState};

/// Pool settings from the database section.
#[must_use]
pub fn pool_config(database: &DatabaseConfig) -> PoolConfig {
    PoolConfig {
        max_connections: database.max_connections,
        min_connections: database.min_connections,
        acquire_timeout: Duration::from_millis(database.acquire_timeout_ms),
        idle_timeout: database.idle_timeout_secs.map(Duration::from_secs),
        max_lifetime: database.max_lifetime_secs.map(Duration::from_secs),
        test_before_acquire: database.test_before_acquire,
    }
}

/// A composed, ready-to-serve service.
#[derive(Debug)]
pub struct Application {
    server: Server,
    session_manager: Arc<SessionManager>,
}

impl Application {
    /// Opens the pool (when a DSN is configured), builds the identity
    /// provider and composes the service.
    pub async fn from_config(config: &EmporioConfig) -> Result<Self, BootstrapError> {
        let session_manager = Arc::new(SessionManager::new());
        match &config.database.dsn {
            Some(dsn) => {
                session_manager
                    .init_pool(dsn, &pool_config(&config.database))
                    .await?;
            }
            None => tracing::warn!("no database DSN configured, data access is disabled"),
        }

        let provider: Arc<dyn IdentityProvider> = if config.auth.enabled {
            let keycloak = KeycloakProvider::from_config(&config.auth)?;
            tracing::info!(endpoint = keycloak.userinfo_endpoint(), "keycloak userinfo validation");
            Arc::new(keycloak)
        } else {
            Arc::new(StaticProvider::new())
        };

        Ok(Self::compose(config, provider, session_manager))
    }

    /// Wires the given provider and session manager into the pipeline and
    /// routes. Does no I/O.
    #[must_use]
    pub fn compose(
        config: &EmporioConfig,
        provider: Arc<dyn IdentityProvider>,
        session_manager: Arc<SessionManager>,
    ) -> Self {
        let pipeline = Pipeline::builder()
            .logging(LoggingStage::from_config(&config.logging))
            .authentication(AuthenticationStage::from_config(&config.auth, provider))
            .session_manager(Arc::clone(&session_manager))
            .build();

        let state = AppState::new(Arc::clone(&session_manager));
        let server = Server::builder()
            .config(config.server.clone())
            .router(routes::router())
            .handlers(routes::handlers(&state))
            .pipeline(pipeline)
            .session_manager(Arc::clone(&session_manager))
            .build();

        Self {
            server,
            session_manager,
        }
    }

    /// The composed server.
    #[must_use]
    pub const fn server(&self) -> &Server {
        &self.server
    }

    /// The process-wide session manager.
    #[must_use]
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session_manager
    }

    /// Handles one request in-process.
    pub async fn handle(&self, request: Request) -> Response {
        self.server.handle(request).await
    }

    /// Serves until SIGTERM/SIGINT. The pool is disposed even if serving
    /// fails.
    pub async fn run(self) -> Result<(), BootstrapError> {
        let result = self.server.run().await;
        self.session_manager.dispose_pool().await;
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_from_settings() {
        let database = DatabaseConfig {
            max_connections: 4,
            acquire_timeout_ms: 250,
            idle_timeout_secs: None,
            ..DatabaseConfig::default()
        };
        let pool = pool_config(&database);
        assert_eq!(pool.max_connections, 4);
        assert_eq!(pool.acquire_timeout, Duration::from_millis(250));
        assert_eq!(pool.idle_timeout, None);
        assert_eq!(pool.max_lifetime, Some(Duration::from_secs(1800)));
    }

    #[tokio::test]
    async fn test_from_config_without_dsn_starts_uninitialized() {
        let app = Application::from_config(&EmporioConfig::default()).await.unwrap();
        assert!(!app.session_manager().is_initialized());
        assert_eq!(app.server().pipeline().stage_count(), 4);
    }

    #[tokio::test]
    async fn test_from_config_with_auth_builds_keycloak_client() {
        let mut config = EmporioConfig::default();
        config.auth.enabled = true;
        let app = Application::from_config(&config).await.unwrap();
        assert!(!app.server().router().is_empty());
    }
}
