//! Per-request state carried through the stages.
//!
//! The [`MiddlewareContext`] is owned by one request and mutated by the stages
//! as it passes through them: the logging stage settles the correlation id,
//! the authentication stage attaches claims. The session stage then freezes a
//! copy of it into the [`RequestScope`](crate::scope::RequestScope) that
//! handlers read.

use emporio_core::{Claims, RequestId};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Mutable context for one request.
///
/// # Example
///
/// ```
/// use emporio_core::Claims;
/// use emporio_middleware::MiddlewareContext;
///
/// let mut ctx = MiddlewareContext::new();
/// assert!(ctx.claims().is_none());
///
/// let claims = Claims::try_from(serde_json::json!({ "sub": "u-1" })).unwrap();
/// ctx.set_claims(claims);
/// assert_eq!(ctx.claims().and_then(|c| c.subject()), Some("u-1"));
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    request_id: RequestId,
    claims: Option<Arc<Claims>>,
    started_at: Instant,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a context with a specific request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            claims: None,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Sets the request ID. Only the logging stage does this.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = request_id;
    }

    /// Verified claims, absent when authentication was skipped.
    #[must_use]
    pub fn claims(&self) -> Option<&Arc<Claims>> {
        self.claims.as_ref()
    }

    /// Attaches verified claims. Only the authentication stage does this.
    pub fn set_claims(&mut self, claims: Claims) {
        self.claims = Some(Arc::new(claims));
    }

    /// When the context was created.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value, replacing any previous one.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_context_is_anonymous() {
        let ctx = MiddlewareContext::new();
        assert!(ctx.claims().is_none());
    }

    #[test]
    fn test_request_id_override() {
        let id = RequestId::new();
        let mut ctx = MiddlewareContext::new();
        assert_ne!(ctx.request_id(), id);

        ctx.set_request_id(id);
        assert_eq!(ctx.request_id(), id);
        assert_eq!(MiddlewareContext::with_request_id(id).request_id(), id);
    }

    #[test]
    fn test_claims_are_shared() {
        let mut ctx = MiddlewareContext::new();
        ctx.set_claims(Claims::try_from(json!({ "sub": "u-7", "scope": "items:read" })).unwrap());

        let claims = Arc::clone(ctx.claims().unwrap());
        assert_eq!(claims.subject(), Some("u-7"));
        assert_eq!(Arc::strong_count(&claims), 2);
    }

    #[test]
    fn test_extensions() {
        #[derive(Debug, PartialEq)]
        struct OperationId(&'static str);

        let mut ctx = MiddlewareContext::new();
        assert!(ctx.get_extension::<OperationId>().is_none());

        ctx.set_extension(OperationId("getItem"));
        assert_eq!(ctx.get_extension(), Some(&OperationId("getItem")));
        assert_eq!(ctx.remove_extension::<OperationId>(), Some(OperationId("getItem")));
        assert!(ctx.get_extension::<OperationId>().is_none());
    }

    #[test]
    fn test_elapsed_time() {
        let ctx = MiddlewareContext::new();
        std::thread::sleep(Duration::from_millis(5));
        assert!(ctx.elapsed() >= Duration::from_millis(5));
    }
}
