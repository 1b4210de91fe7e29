//! Outermost safety net.
//!
//! Anything that escapes the inner stages as a panic, and any 500 response
//! built by an inner layer, leaves the service as the same fixed body:
//!
//! ```json
//! {"error":{"code":"INTERNAL_ERROR","message":"Internal Server Error"}}
//! ```
//!
//! The real cause is logged here with the request's correlation id and never
//! reaches the caller. Other statuses (401, 404, 503 ...) pass through
//! untouched.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use emporio_core::{RequestId, GENERIC_INTERNAL_MESSAGE};
use futures_util::FutureExt;
use http::StatusCode;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt, REQUEST_ID_HEADER};

/// Error code of the generic failure body.
pub const INTERNAL_ERROR_CODE: &str = "INTERNAL_ERROR";

/// Converts unhandled failures into the generic 500 response.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionBoundaryStage;

impl ExceptionBoundaryStage {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// The fixed response every unhandled failure becomes.
#[must_use]
pub fn generic_failure(request_id: RequestId) -> Response {
    let mut response = Response::json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_ERROR_CODE,
        GENERIC_INTERNAL_MESSAGE,
    );
    response.set_request_id(request_id);
    response
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("panic with a non-string payload")
}

impl Middleware for ExceptionBoundaryStage {
    fn name(&self) -> &'static str {
        "exception_boundary"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(ctx, request))
                .catch_unwind()
                .await;
            let request_id = ctx.request_id();

            match outcome {
                Ok(mut response) => {
                    if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
                        let detail = response
                            .failure_detail()
                            .map_or("inner layer returned 500 without detail", |d| d.0.as_str());
                        tracing::error!(
                            request_id = %request_id,
                            error = %detail,
                            "Unhandled failure"
                        );
                        return generic_failure(request_id);
                    }
                    if !response.headers().contains_key(REQUEST_ID_HEADER) {
                        response.set_request_id(request_id);
                    }
                    response
                }
                Err(payload) => {
                    tracing::error!(
                        request_id = %request_id,
                        error = %panic_message(payload.as_ref()),
                        "Request handler panicked"
                    );
                    generic_failure(request_id)
                }
            }
        })
    }
}
