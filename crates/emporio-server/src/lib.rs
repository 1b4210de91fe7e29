//! # Emporio Server
//!
//! HTTP/1.1 server for Emporio built on hyper.
//!
//! - [`Router`] - method + `{param}` path matching with 404/405 resolution
//! - [`HandlerRegistry`] - typed async handlers keyed by operation id
//! - [`Server`] - accept loop that runs each request through the middleware
//!   pipeline, with per-request timeouts and graceful draining
//! - [`ShutdownSignal`] / [`ConnectionTracker`] - shutdown coordination
//!
//! ## Example
//!
//! ```rust,no_run
//! use emporio_server::{HandlerRegistry, Server};
//! use http::Method;
//!
//! # async fn run() -> Result<(), emporio_server::ServerError> {
//! let mut handlers = HandlerRegistry::new();
//! handlers.register_no_body("health", |_ctx| async {
//!     Ok(serde_json::json!({ "status": "ok" }))
//! });
//!
//! Server::builder()
//!     .route(Method::GET, "/health", "health")
//!     .handlers(handlers)
//!     .build()
//!     .run()
//!     .await
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod handler;
pub mod router;
pub mod server;
pub mod shutdown;

pub use handler::{ErasedHandler, HandlerContext, HandlerRegistry, HandlerResult, InvokeError};
pub use router::{Resolution, RouteMatch, Router};
pub use server::{Server, ServerBuilder, ServerError};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
