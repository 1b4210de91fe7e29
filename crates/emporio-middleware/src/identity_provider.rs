//! Identity providers used by the authentication stage.
//!
//! Only token validation happens here: the bearer token is forwarded to the
//! provider's userinfo endpoint and the returned JSON object becomes the
//! request's [`Claims`]. Token issuance is the provider's business.

use std::collections::HashMap;
use std::time::Duration;

use emporio_config::AuthConfig;
use emporio_core::Claims;
use futures_util::FutureExt;
use reqwest::Client;

use crate::middleware::BoxFuture;

/// Why a token could not be turned into claims.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("identity provider rejected the token with status {status}")]
    Rejected {
        /// HTTP status returned by the provider.
        status: u16,
    },

    /// No answer within the configured timeout.
    #[error("identity provider did not answer within {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The provider could not be reached.
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),

    /// The provider answered 200 with something other than a JSON object.
    #[error("identity provider returned an invalid userinfo document: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be built.
    #[error("identity provider client configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Timeout { .. } => "timeout",
            Self::Unreachable(_) => "unreachable",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Configuration(_) => "configuration",
        }
    }
}

/// Resolves a bearer token into verified claims.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Validates `token` and returns its claims.
    fn userinfo<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Claims, ProviderError>>;
}

/// Keycloak realm userinfo client.
#[derive(Debug, Clone)]
pub struct KeycloakProvider {
    client: Client,
    userinfo_endpoint: String,
    timeout: Duration,
}

impl KeycloakProvider {
    /// Builds a client for the realm in `config.keycloak`, bounded by
    /// `config.provider_timeout_ms`.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Configuration`] if the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ProviderError> {
        Self::new(config.keycloak.userinfo_endpoint(), config.provider_timeout())
    }

    /// Builds a client for an explicit userinfo endpoint.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Configuration`] if the HTTP client cannot be built.
    pub fn new(userinfo_endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            userinfo_endpoint: userinfo_endpoint.into(),
            timeout,
        })
    }

    /// The endpoint tokens are checked against.
    #[must_use]
    pub fn userinfo_endpoint(&self) -> &str {
        &self.userinfo_endpoint
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                timeout_ms: emporio_core::millis(self.timeout),
            }
        } else {
            ProviderError::Unreachable(err.to_string())
        }
    }

    async fn fetch_userinfo(&self, token: &str) -> Result<Claims, ProviderError> {
        let response = self
            .client
            .get(&self.userinfo_endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        // Only a 200 carries a userinfo document.
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
            });
        }

        let document: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.map_transport_error(&e)
            } else {
                ProviderError::InvalidResponse(e.to_string())
            }
        })?;

        Claims::try_from(document)
            .map_err(|other| ProviderError::InvalidResponse(format!("expected an object, got {other}")))
    }
}

impl IdentityProvider for KeycloakProvider {
    fn name(&self) -> &'static str {
        "keycloak"
    }

    fn userinfo<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Claims, ProviderError>> {
        self.fetch_userinfo(token).boxed()
    }
}

/// Fixed token-to-claims table for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    tokens: HashMap<String, Claims>,
}

impl StaticProvider {
    /// Creates a provider that rejects every token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` and resolves it to `claims`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, claims: Claims) -> Self {
        self.tokens.insert(token.into(), claims);
        self
    }
}

impl IdentityProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn userinfo<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Claims, ProviderError>> {
        let result = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(ProviderError::Rejected { status: 401 });
        futures_util::future::ready(result).boxed()
    }
}
