//! HTTP server.
//!
//! Accepts HTTP/1.1 connections with hyper and runs every request through
//! the middleware [`Pipeline`] before dispatching it to a handler:
//!
//! ```text
//! TCP -> hyper -> collect body -> Pipeline (boundary, logging, auth, session)
//!                                     -> Router -> HandlerRegistry
//! ```
//!
//! [`Server::handle`] is the same path without the socket, which is what the
//! tests and the application's in-process client use.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use emporio_config::ServerConfig;
use emporio_core::{millis, AppError, Claims, RequestId};
use emporio_datastore::SessionManager;
use emporio_middleware::{MiddlewareContext, Pipeline, Request, Response, ResponseExt};
use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};

use crate::handler::{HandlerContext, HandlerRegistry, InvokeError};
use crate::router::{Resolution, Router};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured address does not parse.
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resolves routes and invokes handlers under the request timeout.
#[derive(Debug)]
struct Dispatcher {
    router: Router,
    handlers: HandlerRegistry,
    request_timeout: Duration,
}

impl Dispatcher {
    async fn dispatch(
        &self,
        request_id: RequestId,
        claims: Option<Arc<Claims>>,
        request: Request,
    ) -> Response {
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        let (operation_id, params) = match self.router.resolve(&parts.method, parts.uri.path()) {
            Resolution::Matched(found) => found.into_parts(),
            Resolution::MethodNotAllowed(allowed) => {
                return method_not_allowed(&parts.method, &allowed, request_id);
            }
            Resolution::NotFound => {
                let err = AppError::not_found(format!("No route for {}", parts.uri.path()));
                return Response::from_app_error(&err, Some(request_id));
            }
        };

        tracing::debug!(operation_id = %operation_id, "dispatching");
        let ctx = HandlerContext::new(request_id, claims, operation_id, params);
        self.invoke(ctx, body).await
    }

    async fn invoke(&self, ctx: HandlerContext, body: Bytes) -> Response {
        let request_id = ctx.request_id();
        let operation_id = ctx.operation_id().to_owned();

        let err = match tokio::time::timeout(self.request_timeout, self.handlers.invoke(ctx, body)).await {
            Ok(Ok(response)) => return response,
            Ok(Err(InvokeError::Handler(err))) => err,
            Ok(Err(InvokeError::HandlerNotFound(id))) => {
                AppError::configuration(format!("no handler registered for operation '{id}'"))
            }
            Err(_) => {
                tracing::warn!(
                    operation_id = %operation_id,
                    timeout_ms = millis(self.request_timeout),
                    "handler timed out"
                );
                AppError::timeout("Request timed out")
            }
        };

        if !err.is_server_side() {
            tracing::debug!(operation_id = %operation_id, error = %err, "handler rejected request");
        }
        Response::from_app_error(&err, Some(request_id))
    }
}

fn method_not_allowed(method: &Method, allowed: &[Method], request_id: RequestId) -> Response {
    let err = AppError::method_not_allowed(method.as_str());
    let mut response = Response::from_app_error(&err, Some(request_id));
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

/// The HTTP server.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    pipeline: Arc<Pipeline>,
    dispatcher: Arc<Dispatcher>,
    session_manager: Option<Arc<SessionManager>>,
}

impl Server {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Server settings.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The middleware pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The routing table.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.dispatcher.router
    }

    /// The handler registry.
    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.dispatcher.handlers
    }

    /// Runs one request through the pipeline and the router.
    pub async fn handle(&self, request: Request) -> Response {
        let dispatcher = Arc::clone(&self.dispatcher);
        self.pipeline
            .process(MiddlewareContext::new(), request, move |ctx, request| {
                let request_id = ctx.request_id();
                let claims = ctx.claims().cloned();
                Box::pin(async move { dispatcher.dispatch(request_id, claims, request).await })
            })
            .await
    }

    /// Binds the configured address and serves until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` fires.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr: SocketAddr = self
            .config
            .http_addr
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.config.http_addr.clone()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from `listener` until `shutdown` fires, then
    /// drains in-flight connections and disposes the database pool.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.serve_connection(stream, shutdown).await {
                                tracing::debug!(remote = %remote, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
                () = shutdown.recv() => break,
            }
        }
        drop(listener);

        let drain = server.config.shutdown_timeout();
        tracing::info!(
            connections = tracker.active_connections(),
            timeout_secs = drain.as_secs(),
            "draining connections"
        );
        if tokio::time::timeout(drain, tracker.wait_for_drain()).await.is_err() {
            tracing::warn!(
                connections = tracker.active_connections(),
                "drain timeout reached, abandoning connections"
            );
        }

        if let Some(manager) = &server.session_manager {
            manager.dispose_pool().await;
        }
        tracing::info!("server stopped");
        Ok(())
    }

    async fn serve_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let server = Arc::clone(self);
        let service = service_fn(move |req: hyper::Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_incoming(req).await) }
        });

        let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                // Finish the in-flight request, then close.
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    async fn handle_incoming(&self, req: hyper::Request<Incoming>) -> Response {
        let (parts, body) = req.into_parts();
        let timeout = self.config.request_timeout();

        let bytes = match tokio::time::timeout(timeout, body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                return early_failure(
                    StatusCode::BAD_REQUEST,
                    "BAD_REQUEST",
                    "Failed to read request body",
                    &e.to_string(),
                );
            }
            Err(_) => {
                return early_failure(
                    StatusCode::REQUEST_TIMEOUT,
                    "REQUEST_TIMEOUT",
                    "Request body not received in time",
                    "body collection timed out",
                );
            }
        };

        self.handle(http::Request::from_parts(parts, Full::new(bytes)))
            .await
    }
}

/// Responses for requests that never reach the pipeline still carry an id.
fn early_failure(status: StatusCode, code: &str, message: &str, detail: &str) -> Response {
    let request_id = RequestId::new();
    tracing::warn!(request_id = %request_id, status = status.as_u16(), detail, "request rejected before pipeline");
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": message,
            "request_id": request_id.to_string(),
        }
    });
    let mut response = Response::json(status, &body);
    response.set_request_id(request_id);
    response
}

/// Builder for [`Server`].
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    router: Router,
    handlers: HandlerRegistry,
    pipeline: Option<Pipeline>,
    session_manager: Option<Arc<SessionManager>>,
}

impl ServerBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Server settings.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the routing table.
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Adds one route.
    #[must_use]
    pub fn route(mut self, method: Method, pattern: &str, operation_id: impl Into<String>) -> Self {
        self.router.add_route(method, pattern, operation_id);
        self
    }

    /// Replaces the handler registry.
    #[must_use]
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// The middleware pipeline. Defaults to [`Pipeline::builder`]'s defaults.
    #[must_use]
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Session manager whose pool is disposed after shutdown.
    #[must_use]
    pub fn session_manager(mut self, manager: Arc<SessionManager>) -> Self {
        self.session_manager = Some(manager);
        self
    }

    /// Builds the server, warning about routes without a handler.
    #[must_use]
    pub fn build(self) -> Server {
        let missing: HashMap<&str, &str> = self
            .router
            .routes()
            .filter(|(_, _, op)| !self.handlers.contains(op))
            .map(|(_, pattern, op)| (op, pattern))
            .collect();
        for (operation_id, pattern) in missing {
            tracing::warn!(operation_id, pattern, "route has no handler");
        }

        let request_timeout = self.config.request_timeout();
        Server {
            config: self.config,
            pipeline: Arc::new(self.pipeline.unwrap_or_else(|| Pipeline::builder().build())),
            dispatcher: Arc::new(Dispatcher {
                router: self.router,
                handlers: self.handlers,
                request_timeout,
            }),
            session_manager: self.session_manager,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emporio_datastore::memory::MemoryBackend;
    use emporio_middleware::REQUEST_ID_HEADER;
    use serde_json::{json, Value};

    fn request(method: Method, path: &str, body: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_owned())))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn server(backend: &MemoryBackend, request_timeout_ms: u64) -> Server {
        let manager = Arc::new(SessionManager::new());
        manager.install(Arc::new(backend.clone()), Duration::from_millis(100));

        let mut handlers = HandlerRegistry::new();
        handlers.register_no_body("health", |_ctx| async { Ok(json!({ "status": "ok" })) });
        handlers.register_no_body("viewItem", |ctx: HandlerContext| async move {
            let id: i64 = ctx.parse_param("item_id")?;
            ctx.session()?
                .execute("UPDATE items SET views = views + 1 WHERE id = $1", &[id.into()])
                .await?;
            Ok(json!({ "item_id": id }))
        });
        handlers.register_no_body("slow", |_ctx| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        });

        let config = ServerConfig {
            request_timeout_ms,
            ..ServerConfig::default()
        };
        Server::builder()
            .config(config)
            .route(Method::GET, "/health", "health")
            .route(Method::POST, "/items/{item_id}/view", "viewItem")
            .route(Method::GET, "/slow", "slow")
            .route(Method::GET, "/orphan", "orphan")
            .handlers(handlers)
            .pipeline(
                Pipeline::builder()
                    .session_manager(Arc::clone(&manager))
                    .build(),
            )
            .session_manager(manager)
            .build()
    }

    #[tokio::test]
    async fn test_handle_matched_route() {
        let backend = MemoryBackend::new(2);
        let response = server(&backend, 1_000)
            .handle(request(Method::POST, "/items/9/view", ""))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(body_json(response).await["item_id"], 9);
        assert_eq!(backend.counters().committed, 1);
    }

    #[tokio::test]
    async fn test_not_found_envelope() {
        let backend = MemoryBackend::new(1);
        let response = server(&backend, 1_000)
            .handle(request(Method::GET, "/missing", ""))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let header = response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_owned();
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["request_id"], header.as_str());
    }

    #[tokio::test]
    async fn test_method_not_allowed_lists_methods() {
        let backend = MemoryBackend::new(1);
        let response = server(&backend, 1_000)
            .handle(request(Method::DELETE, "/health", ""))
            .await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET");
    }

    #[tokio::test]
    async fn test_bad_param_is_validation_error_and_rolls_back() {
        let backend = MemoryBackend::new(1);
        let response = server(&backend, 1_000)
            .handle(request(Method::POST, "/items/abc/view", ""))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.counters().begun, 0);
    }

    #[tokio::test]
    async fn test_route_without_handler_is_generic_500() {
        let backend = MemoryBackend::new(1);
        let response = server(&backend, 1_000)
            .handle(request(Method::GET, "/orphan", ""))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Internal Server Error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_timeout_is_504() {
        let backend = MemoryBackend::new(1);
        let response = server(&backend, 50)
            .handle(request(Method::GET, "/slow", ""))
            .await;

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let config = ServerConfig {
            http_addr: "not-an-address".to_owned(),
            ..ServerConfig::default()
        };
        let err = Server::builder()
            .config(config)
            .build()
            .run_with_shutdown(ShutdownSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidAddress(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ServerError::InvalidAddress("x".to_owned());
        assert_eq!(err.to_string(), "invalid bind address 'x'");
    }
}
