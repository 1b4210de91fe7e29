//! Request-scoped context store.
//!
//! The session stage binds a [`RequestScope`] around the rest of the chain
//! with [`bind`]. Handler code, however deeply nested, reads it back with
//! [`current`] or [`session`] without the scope being threaded through
//! parameters.
//!
//! The store is a Tokio task-local, so each request task sees only its own
//! scope. The binding ends when the wrapped future completes, panics or is
//! dropped; there is no separate unbind call to forget.
//!
//! Work moved to another task with `tokio::spawn` does not inherit the
//! scope. A request's session is never handed to a second task.

use std::future::Future;
use std::sync::Arc;

use emporio_core::{AppError, Claims, RequestId};
use emporio_datastore::ScopedSession;

tokio::task_local! {
    static REQUEST_SCOPE: RequestScope;
}

/// What a handler can see about the request it is serving.
#[derive(Debug, Clone)]
pub struct RequestScope {
    request_id: RequestId,
    claims: Option<Arc<Claims>>,
    session: ScopedSession,
}

impl RequestScope {
    /// Creates a scope.
    #[must_use]
    pub const fn new(
        request_id: RequestId,
        claims: Option<Arc<Claims>>,
        session: ScopedSession,
    ) -> Self {
        Self {
            request_id,
            claims,
            session,
        }
    }

    /// Correlation id of the request.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Verified claims, absent when authentication was skipped.
    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_deref()
    }

    /// The request's lazily acquired database session.
    #[must_use]
    pub const fn session(&self) -> &ScopedSession {
        &self.session
    }
}

/// Errors reading the request scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// No scope is bound to the current task.
    #[error("no request scope is bound to the current task")]
    NotBound,
}

impl From<ScopeError> for AppError {
    fn from(err: ScopeError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Runs `future` with `scope` bound as the current request scope.
pub fn bind<F: Future>(scope: RequestScope, future: F) -> impl Future<Output = F::Output> {
    REQUEST_SCOPE.scope(scope, future)
}

/// Whether a request scope is bound to the current task.
#[must_use]
pub fn is_bound() -> bool {
    REQUEST_SCOPE.try_with(|_| ()).is_ok()
}

/// Returns the current request scope.
///
/// # Errors
///
/// [`ScopeError::NotBound`] outside a request.
pub fn current() -> Result<RequestScope, ScopeError> {
    REQUEST_SCOPE
        .try_with(Clone::clone)
        .map_err(|_| ScopeError::NotBound)
}

/// Returns the current request's session.
///
/// # Errors
///
/// [`ScopeError::NotBound`] outside a request.
pub fn session() -> Result<ScopedSession, ScopeError> {
    REQUEST_SCOPE
        .try_with(|scope| scope.session.clone())
        .map_err(|_| ScopeError::NotBound)
}

/// Returns the current request's claims, if any.
///
/// # Errors
///
/// [`ScopeError::NotBound`] outside a request.
pub fn claims() -> Result<Option<Arc<Claims>>, ScopeError> {
    REQUEST_SCOPE
        .try_with(|scope| scope.claims.clone())
        .map_err(|_| ScopeError::NotBound)
}
