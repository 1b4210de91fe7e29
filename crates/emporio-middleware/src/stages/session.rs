//! Session lifecycle and request scope binding.
//!
//! The innermost stage. It creates the request's [`ScopedSession`], binds the
//! [`RequestScope`] around route dispatch, and finishes the session once the
//! handler returns:
//!
//! - status below 400 and no [`FailureDetail`](crate::FailureDetail): commit
//! - anything else, or a panic: roll back
//!
//! The connection goes back to the pool in every case before the response
//! leaves this stage. A commit failure turns the response into a 500.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use emporio_core::AppError;
use emporio_datastore::{ScopedSession, SessionManager};
use futures_util::FutureExt;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::scope::{self, RequestScope};
use crate::types::{Request, Response, ResponseExt};

/// Binds the request scope and owns the commit-or-rollback decision.
#[derive(Debug, Clone)]
pub struct SessionStage {
    manager: Arc<SessionManager>,
}

impl SessionStage {
    /// Creates the stage over a shared session manager.
    #[must_use]
    pub const fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// The session manager requests draw from.
    #[must_use]
    pub const fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }
}

fn succeeded(response: &Response) -> bool {
    response.status().as_u16() < 400 && response.failure_detail().is_none()
}

impl Middleware for SessionStage {
    fn name(&self) -> &'static str {
        "session"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let request_id = ctx.request_id();
            let session = ScopedSession::new(Arc::clone(&self.manager));
            let request_scope = RequestScope::new(request_id, ctx.claims().cloned(), session.clone());

            let outcome = AssertUnwindSafe(scope::bind(request_scope, next.run(ctx, request)))
                .catch_unwind()
                .await;

            match outcome {
                Ok(response) => {
                    let success = succeeded(&response);
                    match session.finish(success).await {
                        Ok(acquired) => {
                            if acquired {
                                tracing::debug!(committed = success, "Request session finished");
                            }
                            response
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "Request session could not be committed");
                            let error = AppError::from(err);
                            Response::from_app_error(&error, Some(request_id))
                        }
                    }
                }
                Err(payload) => {
                    if let Err(err) = session.finish(false).await {
                        tracing::warn!(error = %err, "Rollback after panic failed");
                    }
                    std::panic::resume_unwind(payload)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureDetail;
    use bytes::Bytes;
    use emporio_datastore::memory::MemoryBackend;
    use http::StatusCode;
    use http_body_util::Full;
    use std::time::Duration;

    fn stage(backend: &MemoryBackend) -> SessionStage {
        let manager = Arc::new(SessionManager::new());
        manager.install(Arc::new(backend.clone()), Duration::from_millis(100));
        SessionStage::new(manager)
    }

    fn request() -> Request {
        http::Request::builder()
            .uri("/v1/user/account/signup")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn run_with_status(stage: &SessionStage, status: StatusCode) -> Response {
        let mut ctx = MiddlewareContext::new();
        stage
            .process(
                &mut ctx,
                request(),
                Next::handler(move |_, _| {
                    Box::pin(async move {
                        let session = scope::session().unwrap();
                        session.execute("INSERT INTO users (phone) VALUES ($1)", &["555".into()]).await.unwrap();
                        Response::text(status, "done")
                    })
                }),
            )
            .await
    }

    #[tokio::test]
    async fn test_success_commits_and_releases() {
        let backend = MemoryBackend::new(2);
        let response = run_with_status(&stage(&backend), StatusCode::CREATED).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let counters = backend.counters();
        assert_eq!(counters.committed, 1);
        assert_eq!(counters.rolled_back, 0);
        assert_eq!(counters.in_use(), 0);
    }

    #[tokio::test]
    async fn test_error_status_rolls_back() {
        let backend = MemoryBackend::new(2);
        run_with_status(&stage(&backend), StatusCode::BAD_REQUEST).await;

        let counters = backend.counters();
        assert_eq!(counters.committed, 0);
        assert_eq!(counters.rolled_back, 1);
        assert_eq!(counters.released, 1);
    }

    #[tokio::test]
    async fn test_failure_detail_rolls_back() {
        let backend = MemoryBackend::new(1);
        let stage = stage(&backend);
        let mut ctx = MiddlewareContext::new();
        stage
            .process(
                &mut ctx,
                request(),
                Next::handler(|_, _| {
                    Box::pin(async {
                        scope::session().unwrap().execute("DELETE FROM items", &[]).await.unwrap();
                        let mut response = Response::text(StatusCode::OK, "looks fine");
                        response.extensions_mut().insert(FailureDetail("late failure".into()));
                        response
                    })
                }),
            )
            .await;
        assert_eq!(backend.counters().rolled_back, 1);
    }

    #[tokio::test]
    async fn test_untouched_session_is_never_acquired() {
        let backend = MemoryBackend::new(1);
        let stage = stage(&backend);
        let mut ctx = MiddlewareContext::new();
        let response = stage
            .process(
                &mut ctx,
                request(),
                Next::handler(|_, _| Box::pin(async { Response::text(StatusCode::OK, "pong") })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(backend.counters().begun, 0);
    }

    #[tokio::test]
    async fn test_commit_failure_becomes_500_after_rollback() {
        let backend = MemoryBackend::new(1);
        backend.fail_commits(true);
        let response = run_with_status(&stage(&backend), StatusCode::OK).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.failure_detail().is_some());
        let counters = backend.counters();
        assert_eq!(counters.failed_commits, 1);
        assert_eq!(counters.rolled_back, 1);
        assert_eq!(counters.in_use(), 0);
    }

    #[tokio::test]
    async fn test_panic_rolls_back_and_resumes() {
        let backend = MemoryBackend::new(1);
        let stage = stage(&backend);
        let outcome = AssertUnwindSafe(async {
            let mut ctx = MiddlewareContext::new();
            stage
                .process(
                    &mut ctx,
                    request(),
                    Next::handler(|_, _| {
                        Box::pin(async {
                            scope::session().unwrap().execute("UPDATE items SET stock = 0", &[]).await.unwrap();
                            explode()
                        })
                    }),
                )
                .await
        })
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        let counters = backend.counters();
        assert_eq!(counters.rolled_back, 1);
        assert_eq!(counters.in_use(), 0);
    }

    fn explode() -> Response {
        panic!("handler exploded mid-transaction");
    }
}
