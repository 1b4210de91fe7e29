//! Handler registration and dispatch.
//!
//! Handlers are registered against an operation id (the name a route
//! resolves to) and receive a [`HandlerContext`] plus, for JSON endpoints,
//! the decoded body. They return `Result<T, AppError>`; errors are rendered
//! by the server as the standard error envelope.
//!
//! ```rust
//! use emporio_core::AppError;
//! use emporio_server::{HandlerContext, HandlerRegistry};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Signup {
//!     phone: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Account {
//!     phone: String,
//! }
//!
//! async fn signup(_ctx: HandlerContext, req: Signup) -> Result<Account, AppError> {
//!     Ok(Account { phone: req.phone })
//! }
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("signup", signup);
//! assert!(registry.contains("signup"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use emporio_core::{AppError, Claims, RequestId};
use emporio_datastore::ScopedSession;
use emporio_middleware::{scope, BoxFuture, Response, ResponseExt};
use http::StatusCode;
use serde::{de::DeserializeOwned, Serialize};

/// Result type returned by handlers.
pub type HandlerResult<T> = Result<T, AppError>;

/// A type-erased handler.
pub type ErasedHandler =
    Arc<dyn Fn(HandlerContext, Bytes) -> BoxFuture<'static, HandlerResult<Response>> + Send + Sync>;

/// What a handler knows about the request it serves.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    request_id: RequestId,
    claims: Option<Arc<Claims>>,
    operation_id: String,
    params: HashMap<String, String>,
}

impl HandlerContext {
    /// Creates a context.
    #[must_use]
    pub fn new(
        request_id: RequestId,
        claims: Option<Arc<Claims>>,
        operation_id: impl Into<String>,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            request_id,
            claims,
            operation_id: operation_id.into(),
            params,
        }
    }

    /// Correlation id of the request.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Verified claims, absent on excluded paths or with auth disabled.
    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_deref()
    }

    /// The operation the route resolved to.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// A path parameter, as matched.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// A path parameter parsed into `T`.
    ///
    /// # Errors
    ///
    /// A validation error when the parameter is missing or does not parse.
    pub fn parse_param<T: std::str::FromStr>(&self, name: &str) -> HandlerResult<T> {
        self.param(name)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| AppError::validation(format!("path parameter '{name}' is invalid")))
    }

    /// The request's database session, from the request scope.
    ///
    /// # Errors
    ///
    /// A configuration error when called outside the pipeline.
    pub fn session(&self) -> HandlerResult<ScopedSession> {
        Ok(scope::session()?)
    }
}

/// Errors from [`HandlerRegistry::invoke`].
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// No handler registered for the operation.
    #[error("no handler registered for operation: {0}")]
    HandlerNotFound(String),

    /// The handler returned an error.
    #[error(transparent)]
    Handler(#[from] AppError),
}

fn json_response<T: Serialize>(value: &T) -> HandlerResult<Response> {
    let body = serde_json::to_value(value)
        .map_err(|e| AppError::internal_with_source("response serialization failed", e))?;
    Ok(Response::json(StatusCode::OK, &body))
}

/// Maps operation ids to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, ErasedHandler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("operations", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler taking a JSON body. An undecodable body is a 400.
    pub fn register<Req, Res, F, Fut>(&mut self, operation_id: impl Into<String>, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(HandlerContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Res>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx: HandlerContext, body: Bytes| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let request: Req = serde_json::from_slice(&body)
                    .map_err(|e| AppError::validation(format!("Invalid request body: {e}")))?;
                let response = handler(ctx, request).await?;
                json_response(&response)
            })
        });
        self.handlers.insert(operation_id.into(), erased);
    }

    /// Registers a handler that ignores the body.
    pub fn register_no_body<Res, F, Fut>(&mut self, operation_id: impl Into<String>, handler: F)
    where
        Res: Serialize + Send + 'static,
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Res>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx: HandlerContext, _body: Bytes| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let response = handler(ctx).await?;
                json_response(&response)
            })
        });
        self.handlers.insert(operation_id.into(), erased);
    }

    /// Registers a handler that builds its own response from the raw body.
    pub fn register_raw<F, Fut>(&mut self, operation_id: impl Into<String>, handler: F)
    where
        F: Fn(HandlerContext, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx: HandlerContext, body: Bytes| {
            let handler = Arc::clone(&handler);
            Box::pin(async move { handler(ctx, body).await })
        });
        self.handlers.insert(operation_id.into(), erased);
    }

    /// Whether a handler is registered for `operation_id`.
    #[must_use]
    pub fn contains(&self, operation_id: &str) -> bool {
        self.handlers.contains_key(operation_id)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered operation ids.
    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Invokes the handler for `ctx.operation_id()`.
    ///
    /// # Errors
    ///
    /// [`InvokeError::HandlerNotFound`] for an unknown operation, otherwise
    /// the handler's own error.
    pub async fn invoke(&self, ctx: HandlerContext, body: Bytes) -> Result<Response, InvokeError> {
        let handler = self
            .handlers
            .get(ctx.operation_id())
            .ok_or_else(|| InvokeError::HandlerNotFound(ctx.operation_id().to_owned()))?;
        Ok(handler(ctx, body).await?)
    }
}
