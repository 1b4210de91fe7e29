//! Fixed-order request pipeline.
//!
//! Every request passes the same four stages:
//!
//! 1. **Exception boundary** - outermost; turns panics and 500s into the
//!    generic failure body
//! 2. **Logging** - correlation id, request span, start and completion lines
//! 3. **Authentication** - bearer token validation, 401 on failure
//! 4. **Session** - request scope binding and commit-or-rollback
//!
//! then the route handler. Post-processing happens in exactly the reverse
//! order as the call returns. The builder only lets callers supply the
//! configured stage values; it cannot reorder, drop or insert stages.

use std::sync::Arc;

use emporio_datastore::SessionManager;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::stages::{AuthenticationStage, ExceptionBoundaryStage, LoggingStage, SessionStage};
use crate::types::{Request, Response};

/// A type-erased stage.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The composed, immutable pipeline.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use emporio_datastore::SessionManager;
/// use emporio_middleware::{LoggingStage, Pipeline};
///
/// let pipeline = Pipeline::builder()
///     .logging(LoggingStage::new())
///     .session_manager(Arc::new(SessionManager::new()))
///     .build();
///
/// assert_eq!(
///     pipeline.stage_names(),
///     vec!["exception_boundary", "logging", "authentication", "session"]
/// );
/// ```
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    /// Creates a pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Composes `stages`, outermost first. Only the builder and tests call
    /// this; the order it receives is the order requests see.
    pub(crate) fn compose(stages: Vec<BoxedMiddleware>) -> Self {
        Self { stages }
    }

    /// Runs `request` through every stage and then `handler`.
    pub async fn process<H>(&self, mut ctx: MiddlewareContext, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        let next = self.build_chain(handler);
        next.run(&mut ctx, request).await
    }

    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Stage names, outermost first.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Collects the configured stage values for a [`Pipeline`].
///
/// Stages that are not supplied get their neutral form: logging with every
/// toggle on, authentication disabled, and a session stage over an
/// uninitialized [`SessionManager`] (data access then fails with a
/// configuration error).
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    logging: Option<LoggingStage>,
    authentication: Option<AuthenticationStage>,
    session: Option<SessionStage>,
}

impl PipelineBuilder {
    /// Creates a builder with no stages configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the logging stage.
    #[must_use]
    pub const fn logging(mut self, stage: LoggingStage) -> Self {
        self.logging = Some(stage);
        self
    }

    /// Sets the authentication stage.
    #[must_use]
    pub fn authentication(mut self, stage: AuthenticationStage) -> Self {
        self.authentication = Some(stage);
        self
    }

    /// Sets the session manager the session stage draws from.
    #[must_use]
    pub fn session_manager(mut self, manager: Arc<SessionManager>) -> Self {
        self.session = Some(SessionStage::new(manager));
        self
    }

    /// Composes the stages in [`Stage::all`] order.
    #[must_use]
    pub fn build(mut self) -> Pipeline {
        let stages: Vec<BoxedMiddleware> = Stage::all()
            .into_iter()
            .map(|stage| self.take_stage(stage))
            .collect();
        Pipeline::compose(stages)
    }

    fn take_stage(&mut self, stage: Stage) -> BoxedMiddleware {
        match stage {
            Stage::ExceptionBoundary => Arc::new(ExceptionBoundaryStage::new()),
            Stage::Logging => Arc::new(self.logging.take().unwrap_or_default()),
            Stage::Authentication => Arc::new(
                self.authentication
                    .take()
                    .unwrap_or_else(AuthenticationStage::disabled),
            ),
            Stage::Session => Arc::new(
                self.session
                    .take()
                    .unwrap_or_else(|| SessionStage::new(Arc::new(SessionManager::new()))),
            ),
        }
    }
}

/// The pipeline stages in their fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Outermost failure conversion.
    ExceptionBoundary = 1,
    /// Correlation id and request logging.
    Logging = 2,
    /// Bearer token validation.
    Authentication = 3,
    /// Request scope and session lifecycle.
    Session = 4,
}

impl Stage {
    /// The stage's middleware name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ExceptionBoundary => "exception_boundary",
            Self::Logging => "logging",
            Self::Authentication => "authentication",
            Self::Session => "session",
        }
    }

    /// All stages, outermost first.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [
            Self::ExceptionBoundary,
            Self::Logging,
            Self::Authentication,
            Self::Session,
        ]
    }
}
