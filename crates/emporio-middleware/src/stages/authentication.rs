//! Bearer token authentication.
//!
//! Each request moves from [`AuthState::Unchecked`] to exactly one of:
//!
//! - [`AuthState::Excluded`]: auth is disabled or the path is excluded; the
//!   request continues without claims
//! - [`AuthState::Unauthenticated`]: the header is missing or malformed, or
//!   the provider refused the token; a 401 is returned and no inner stage runs
//! - [`AuthState::Authenticated`]: the provider returned claims; they are
//!   attached to the context and the request continues
//!
//! Every 401 carries the same body. The reason is only in the logs, where a
//! bad header and a provider failure are reported separately.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use emporio_config::{AuthConfig, DEFAULT_EXCLUDED_PATHS};
use emporio_core::AppError;
use http::header::{HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};

use crate::context::MiddlewareContext;
use crate::identity_provider::{IdentityProvider, ProviderError, StaticProvider};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};

/// Public message of every authentication failure.
pub const UNAUTHENTICATED_MESSAGE: &str = "Not authenticated";

/// Where a request ended up in the authentication state machine.
///
/// Stored in the [`MiddlewareContext`] extensions once decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Not yet looked at.
    Unchecked,
    /// Auth disabled or path excluded.
    Excluded,
    /// Rejected with 401.
    Unauthenticated,
    /// Claims attached.
    Authenticated,
}

/// Why the `Authorization` header was unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderProblem {
    Missing,
    NotText,
    NotBearer,
    EmptyToken,
}

impl HeaderProblem {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing Authorization header",
            Self::NotText => "Authorization header is not valid text",
            Self::NotBearer => "Authorization scheme is not Bearer",
            Self::EmptyToken => "empty bearer token",
        }
    }
}

/// Validates bearer tokens against an [`IdentityProvider`].
pub struct AuthenticationStage {
    enabled: bool,
    excluded_paths: HashSet<String>,
    timeout: Duration,
    provider: Arc<dyn IdentityProvider>,
}

impl std::fmt::Debug for AuthenticationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationStage")
            .field("enabled", &self.enabled)
            .field("excluded_paths", &self.excluded_paths)
            .field("timeout", &self.timeout)
            .field("provider", &self.provider.name())
            .finish()
    }
}

fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

impl AuthenticationStage {
    /// Enabled stage with the default excluded paths and a 5 second timeout.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            enabled: true,
            excluded_paths: DEFAULT_EXCLUDED_PATHS
                .iter()
                .map(|p| normalize_path(p).to_owned())
                .collect(),
            timeout: Duration::from_secs(5),
            provider,
        }
    }

    /// Stage configured from the `[auth]` settings.
    #[must_use]
    pub fn from_config(config: &AuthConfig, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            enabled: config.enabled,
            excluded_paths: config
                .excluded_paths
                .iter()
                .map(|p| normalize_path(p).to_owned())
                .collect(),
            timeout: config.provider_timeout(),
            provider,
        }
    }

    /// Stage that lets every request through without claims.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Arc::new(StaticProvider::new()))
        }
    }

    /// Replaces the excluded path set.
    #[must_use]
    pub fn with_excluded_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded_paths = paths
            .into_iter()
            .map(|p| normalize_path(p.as_ref()).to_owned())
            .collect();
        self
    }

    /// Replaces the provider call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether requests are checked at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `path` bypasses authentication. Trailing slashes are ignored.
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.contains(normalize_path(path))
    }

    fn bearer_token(request: &Request) -> Result<&str, HeaderProblem> {
        let value = request
            .headers()
            .get(AUTHORIZATION)
            .ok_or(HeaderProblem::Missing)?
            .to_str()
            .map_err(|_| HeaderProblem::NotText)?;

        let (scheme, token) = value.split_once(' ').ok_or(HeaderProblem::NotBearer)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(HeaderProblem::NotBearer);
        }
        let token = token.trim();
        if token.is_empty() {
            return Err(HeaderProblem::EmptyToken);
        }
        Ok(token)
    }

    async fn resolve(&self, token: &str) -> Result<emporio_core::Claims, ProviderError> {
        match tokio::time::timeout(self.timeout, self.provider.userinfo(token)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                timeout_ms: emporio_core::millis(self.timeout),
            }),
        }
    }
}

fn unauthenticated(ctx: &mut MiddlewareContext) -> Response {
    ctx.set_extension(AuthState::Unauthenticated);
    let error = AppError::authentication(UNAUTHENTICATED_MESSAGE);
    let mut response = Response::from_app_error(&error, Some(ctx.request_id()));
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

impl Middleware for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            ctx.set_extension(AuthState::Unchecked);

            if !self.enabled || self.is_excluded(request.uri().path()) {
                ctx.set_extension(AuthState::Excluded);
                return next.run(ctx, request).await;
            }

            let token = match Self::bearer_token(&request) {
                Ok(token) => token,
                Err(problem) => {
                    tracing::info!(
                        reason = problem.as_str(),
                        "Rejected request without a usable bearer token"
                    );
                    return unauthenticated(ctx);
                }
            };

            let resolved = self.resolve(token).await;
            match resolved {
                Ok(claims) => {
                    tracing::debug!(subject = %claims.log_id(), "Authenticated request");
                    ctx.set_claims(claims);
                    ctx.set_extension(AuthState::Authenticated);
                    next.run(ctx, request).await
                }
                Err(err) => {
                    tracing::warn!(
                        provider = self.provider.name(),
                        failure = err.kind(),
                        error = %err,
                        "Identity provider did not accept the token"
                    );
                    unauthenticated(ctx)
                }
            }
        })
    }
}
