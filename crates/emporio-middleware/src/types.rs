//! Request and response types shared by every stage.

use bytes::Bytes;
use emporio_core::{AppError, RequestId};
use http::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use http::StatusCode;
use http_body_util::Full;

/// The HTTP request type used in the pipeline.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// Correlation id header, read on the way in and stamped on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Server-side detail attached to a response as an extension.
///
/// Inner layers that turn an internal failure into a response attach this so
/// the session stage rolls back and the exception boundary can log the detail
/// before replacing the body. It never reaches the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDetail(pub String);

/// Constructors for the responses the pipeline itself produces.
pub trait ResponseExt {
    /// A `text/plain` response.
    fn text(status: StatusCode, body: &str) -> Response;

    /// An `application/json` response.
    fn json(status: StatusCode, body: &serde_json::Value) -> Response;

    /// A JSON error body of the form `{"error":{"code","message"}}`.
    fn json_error(status: StatusCode, code: &str, message: &str) -> Response;

    /// Renders an [`AppError`] as its envelope.
    ///
    /// Server-side errors carry a [`FailureDetail`] with the full error chain;
    /// unavailable errors carry `Retry-After`.
    fn from_app_error(error: &AppError, request_id: Option<RequestId>) -> Response;

    /// The attached [`FailureDetail`], if any.
    fn failure_detail(&self) -> Option<&FailureDetail>;

    /// Overwrites the `X-Request-Id` header.
    fn set_request_id(&mut self, request_id: RequestId);
}

fn build(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response {
    let mut response = http::Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

impl ResponseExt for Response {
    fn text(status: StatusCode, body: &str) -> Response {
        build(status, "text/plain; charset=utf-8", body.to_owned())
    }

    fn json(status: StatusCode, body: &serde_json::Value) -> Response {
        build(status, "application/json", body.to_string())
    }

    fn json_error(status: StatusCode, code: &str, message: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": message
            }
        });
        Self::json(status, &body)
    }

    fn from_app_error(error: &AppError, request_id: Option<RequestId>) -> Response {
        let request_id = request_id.map(|id| id.to_string());
        let envelope = error.to_envelope(request_id.as_deref());
        let body = serde_json::to_vec(&envelope).unwrap_or_default();

        let mut response = build(error.status_code(), "application/json", body);
        if let Some(seconds) = error.retry_after_seconds() {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        if error.is_server_side() {
            response
                .extensions_mut()
                .insert(FailureDetail(error.detail()));
        }
        response
    }

    fn failure_detail(&self) -> Option<&FailureDetail> {
        self.extensions().get::<FailureDetail>()
    }

    fn set_request_id(&mut self, request_id: RequestId) {
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            self.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
    }
}
