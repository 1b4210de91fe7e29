//! The four pipeline stages, outermost first.
//!
//! 1. [`exception_boundary`] - unhandled failures become a generic 500
//! 2. [`logging`] - correlation id, request span, start/complete lines
//! 3. [`authentication`] - bearer token validation
//! 4. [`session`] - request scope binding and commit/rollback
//!
//! Route dispatch runs inside the session stage.

pub mod authentication;
pub mod exception_boundary;
pub mod logging;
pub mod session;

pub use authentication::{AuthState, AuthenticationStage};
pub use exception_boundary::ExceptionBoundaryStage;
pub use logging::LoggingStage;
pub use session::SessionStage;
