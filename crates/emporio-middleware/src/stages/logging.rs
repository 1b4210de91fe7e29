//! Request logging and correlation id stamping.
//!
//! On entry the stage settles the request's correlation id (a trusted
//! incoming `X-Request-Id` UUID, otherwise the context's own UUID v7), opens
//! a `request` span carrying it and logs the start line. Everything inner
//! stages and handlers log happens inside that span.
//!
//! On exit it logs status and duration and stamps `X-Request-Id` on the
//! response. A panic unwinding through the stage is logged as a failed
//! request and then resumed for the exception boundary to handle.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use emporio_config::LoggingConfig;
use emporio_core::RequestId;
use futures_util::FutureExt;
use tracing::Instrument;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt, REQUEST_ID_HEADER};

/// Logs every request and stamps its correlation id on the response.
#[derive(Debug, Clone, Copy)]
pub struct LoggingStage {
    log_requests: bool,
    log_responses: bool,
    trust_incoming: bool,
}

impl LoggingStage {
    /// Logs both lines and trusts incoming request ids.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            log_requests: true,
            log_responses: true,
            trust_incoming: true,
        }
    }

    /// Takes the toggles from the `[logging]` settings.
    #[must_use]
    pub const fn from_config(config: &LoggingConfig) -> Self {
        Self {
            log_requests: config.log_requests,
            log_responses: config.log_responses,
            trust_incoming: config.trust_incoming_request_id,
        }
    }

    /// Whether an incoming `X-Request-Id` may be reused.
    #[must_use]
    pub const fn trusts_incoming(&self) -> bool {
        self.trust_incoming
    }

    fn incoming_request_id(&self, request: &Request) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(RequestId::parse)
    }
}

impl Default for LoggingStage {
    fn default() -> Self {
        Self::new()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    emporio_core::millis(started.elapsed())
}

impl Middleware for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        if let Some(incoming) = self.incoming_request_id(&request) {
            ctx.set_request_id(incoming);
        }
        let request_id = ctx.request_id();
        let method = request.method().clone();
        let path = request.uri().path().to_owned();
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            http.method = %method,
            http.path = %path,
        );

        Box::pin(
            async move {
                let started = Instant::now();
                if self.log_requests {
                    emporio_telemetry::log_request_start!(request_id, method, path);
                }

                let outcome = AssertUnwindSafe(next.run(ctx, request))
                    .catch_unwind()
                    .await;
                let duration_ms = elapsed_ms(started);

                match outcome {
                    Ok(mut response) => {
                        if self.log_responses {
                            emporio_telemetry::log_request_complete!(
                                request_id,
                                response.status().as_u16(),
                                duration_ms
                            );
                        }
                        response.set_request_id(request_id);
                        response
                    }
                    Err(payload) => {
                        emporio_telemetry::log_request_failed!(
                            request_id,
                            duration_ms,
                            "unwound without a response"
                        );
                        std::panic::resume_unwind(payload)
                    }
                }
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    fn request_with_id(id: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/items/42");
        if let Some(id) = id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    async fn run(stage: LoggingStage, request: Request) -> (RequestId, Response) {
        let mut ctx = MiddlewareContext::new();
        let response = stage
            .process(
                &mut ctx,
                request,
                Next::handler(|_, _| Box::pin(async { Response::text(StatusCode::OK, "ok") })),
            )
            .await;
        (ctx.request_id(), response)
    }

    fn header(response: &Response) -> String {
        response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_generates_and_stamps_request_id() {
        let (id, response) = run(LoggingStage::new(), request_with_id(None)).await;
        assert_eq!(header(&response), id.to_string());
    }

    #[tokio::test]
    async fn test_reuses_trusted_incoming_id() {
        let incoming = RequestId::new().to_string();
        let (id, response) = run(LoggingStage::new(), request_with_id(Some(&incoming))).await;
        assert_eq!(id.to_string(), incoming);
        assert_eq!(header(&response), incoming);
    }

    #[tokio::test]
    async fn test_ignores_invalid_incoming_id() {
        let (id, response) = run(LoggingStage::new(), request_with_id(Some("not-a-uuid"))).await;
        assert_eq!(header(&response), id.to_string());
        assert_ne!(header(&response), "not-a-uuid");
    }

    #[tokio::test]
    async fn test_untrusted_incoming_id_is_replaced() {
        let config = LoggingConfig {
            trust_incoming_request_id: false,
            ..LoggingConfig::default()
        };
        let stage = LoggingStage::from_config(&config);
        assert!(!stage.trusts_incoming());

        let incoming = RequestId::new().to_string();
        let (id, response) = run(stage, request_with_id(Some(&incoming))).await;
        assert_ne!(id.to_string(), incoming);
        assert_eq!(header(&response), id.to_string());
    }

    #[tokio::test]
    async fn test_panic_is_resumed() {
        let stage = LoggingStage::new();
        let outcome = AssertUnwindSafe(async {
            let mut ctx = MiddlewareContext::new();
            stage
                .process(
                    &mut ctx,
                    request_with_id(None),
                    Next::handler(|_, _| Box::pin(async { explode() })),
                )
                .await
        })
        .catch_unwind()
        .await;
        assert!(outcome.is_err());
    }

    fn explode() -> Response {
        panic!("handler exploded");
    }
}
