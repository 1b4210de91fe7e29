//! # Emporio Middleware
//!
//! The fixed-order request pipeline every Emporio request passes through.
//!
//! ```text
//! Request → ExceptionBoundary → Logging → Authentication → Session → Handler
//!                                                                      ↓
//! Response ← ExceptionBoundary ← Logging ← Authentication ← Session ←──┘
//! ```
//!
//! | Stage | Middleware         | Purpose                                         |
//! |-------|--------------------|-------------------------------------------------|
//! | 1     | Exception boundary | Panics and 500s become one generic body         |
//! | 2     | Logging            | Correlation id, request span, `X-Request-Id`    |
//! | 3     | Authentication     | Bearer token → identity provider → claims / 401 |
//! | 4     | Session            | Request scope, lazy session, commit or rollback |
//!
//! Handlers reach the request's session and claims through [`scope`]
//! instead of parameters.
//!
//! ## Example
//!
//! ```
//! use emporio_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 4);
//! assert_eq!(stages[0].name(), "exception_boundary");
//! assert_eq!(stages[3].name(), "session");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod identity_provider;
pub mod middleware;
pub mod pipeline;
pub mod scope;
pub mod stages;
pub mod types;

pub use context::MiddlewareContext;
pub use identity_provider::{IdentityProvider, KeycloakProvider, ProviderError, StaticProvider};
pub use middleware::{BoxFuture, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use scope::{RequestScope, ScopeError};
pub use stages::{
    AuthState, AuthenticationStage, ExceptionBoundaryStage, LoggingStage, SessionStage,
};
pub use types::{FailureDetail, Request, Response, ResponseExt, REQUEST_ID_HEADER};
