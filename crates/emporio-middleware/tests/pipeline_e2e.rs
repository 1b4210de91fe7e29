//! End-to-end pipeline tests: all four stages over the in-memory datastore
//! and a static identity provider.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use emporio_core::{AppError, Claims};
use emporio_datastore::memory::MemoryBackend;
use emporio_datastore::SessionManager;
use emporio_middleware::{
    scope, AuthenticationStage, BoxFuture, LoggingStage, MiddlewareContext, Pipeline, Request,
    Response, ResponseExt, StaticProvider, REQUEST_ID_HEADER,
};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::{json, Value};

const GOOD_TOKEN: &str = "token-alice";

fn claims() -> Claims {
    Claims::try_from(json!({ "sub": "alice-id", "preferred_username": "alice" })).unwrap()
}

fn pipeline(backend: &MemoryBackend, acquire_timeout: Duration) -> Pipeline {
    pipeline_with_manager(backend, acquire_timeout).0
}

fn pipeline_with_manager(
    backend: &MemoryBackend,
    acquire_timeout: Duration,
) -> (Pipeline, Arc<SessionManager>) {
    let manager = Arc::new(SessionManager::new());
    manager.install(Arc::new(backend.clone()), acquire_timeout);
    let provider = Arc::new(StaticProvider::new().with_token(GOOD_TOKEN, claims()));

    let pipeline = Pipeline::builder()
        .logging(LoggingStage::new())
        .authentication(AuthenticationStage::new(provider))
        .session_manager(Arc::clone(&manager))
        .build();
    (pipeline, manager)
}

fn request(method: Method, path: &str, authorization: Option<&str>) -> Request {
    let mut builder = http::Request::builder().method(method).uri(path);
    if let Some(value) = authorization {
        builder = builder.header(http::header::AUTHORIZATION, value);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

fn authorized(path: &str) -> Request {
    request(Method::GET, path, Some(&format!("Bearer {GOOD_TOKEN}")))
}

fn request_id_header(response: &Response) -> String {
    response
        .headers()
        .get(REQUEST_ID_HEADER)
        .expect("every response carries X-Request-Id")
        .to_str()
        .unwrap()
        .to_string()
}

async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Handler that writes through the request session and echoes the subject.
fn writing_handler(_ctx: &mut MiddlewareContext, _req: Request) -> BoxFuture<'static, Response> {
    Box::pin(async {
        let scope = scope::current().unwrap();
        let session = scope.session().clone();
        session
            .execute("INSERT INTO users (phone) VALUES ($1)", &["+3900000".into()])
            .await
            .unwrap();
        let subject = scope.claims().and_then(Claims::subject).map(str::to_owned);
        Response::json(StatusCode::OK, &json!({ "subject": subject }))
    })
}

/// Handler that touches the session and then fails.
fn failing_handler(_ctx: &mut MiddlewareContext, _req: Request) -> BoxFuture<'static, Response> {
    Box::pin(async {
        let scope = scope::current().unwrap();
        scope
            .session()
            .execute("UPDATE items SET stock = stock - 1", &[])
            .await
            .unwrap();
        let error = AppError::internal("stock ledger out of sync for warehouse 7");
        Response::from_app_error(&error, Some(scope.request_id()))
    })
}

fn panicking_handler(_ctx: &mut MiddlewareContext, _req: Request) -> BoxFuture<'static, Response> {
    Box::pin(async {
        scope::session()
            .unwrap()
            .execute("DELETE FROM items", &[])
            .await
            .unwrap();
        explode()
    })
}

fn explode() -> Response {
    panic!("index out of bounds in pricing table");
}

fn pong(_ctx: &mut MiddlewareContext, _req: Request) -> BoxFuture<'static, Response> {
    Box::pin(async { Response::text(StatusCode::OK, "pong") })
}

#[tokio::test]
async fn test_excluded_path_never_401() {
    let backend = MemoryBackend::new(2);
    let pipeline = pipeline(&backend, Duration::from_secs(1));

    for authorization in [None, Some("garbage"), Some("Bearer forged")] {
        let response = pipeline
            .process(
                MiddlewareContext::new(),
                request(Method::GET, "/health", authorization),
                pong,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{authorization:?}");
    }
}

#[tokio::test]
async fn test_missing_token_is_401_without_session() {
    let backend = MemoryBackend::new(2);
    let pipeline = pipeline(&backend, Duration::from_secs(1));

    let response = pipeline
        .process(
            MiddlewareContext::new(),
            request(Method::POST, "/v1/user/account/signup", None),
            writing_handler,
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let id = request_id_header(&response);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(body["request_id"], id.as_str());

    let counters = backend.counters();
    assert_eq!(counters.begun, 0);
    assert!(backend.statements().is_empty());
}

#[tokio::test]
async fn test_success_commits_before_response() {
    let backend = MemoryBackend::new(2);
    let pipeline = pipeline(&backend, Duration::from_secs(1));

    let response = pipeline
        .process(MiddlewareContext::new(), authorized("/v1/user/account/signup"), writing_handler)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        backend.committed_statements(),
        vec!["INSERT INTO users (phone) VALUES ($1)".to_string()]
    );
    let counters = backend.counters();
    assert_eq!(counters.committed, 1);
    assert_eq!(counters.in_use(), 0);

    let body = json_body(response).await;
    assert_eq!(body["subject"], "alice-id");
}

#[tokio::test]
async fn test_handler_failure_is_one_generic_500_with_rollback() {
    let backend = MemoryBackend::new(2);
    let pipeline = pipeline(&backend, Duration::from_secs(1));

    let response = pipeline
        .process(MiddlewareContext::new(), authorized("/items/1/details"), failing_handler)
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!request_id_header(&response).is_empty());
    let body = json_body(response).await;
    assert_eq!(
        body,
        json!({ "error": { "code": "INTERNAL_ERROR", "message": "Internal Server Error" } })
    );

    let counters = backend.counters();
    assert_eq!(counters.committed, 0);
    assert_eq!(counters.rolled_back, 1);
    assert_eq!(counters.released, 1);
    assert!(backend.committed_statements().is_empty());
}

#[tokio::test]
async fn test_panic_is_contained_and_rolled_back() {
    let backend = MemoryBackend::new(1);
    let pipeline = pipeline(&backend, Duration::from_secs(1));

    let response = pipeline
        .process(MiddlewareContext::new(), authorized("/items"), panicking_handler)
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!request_id_header(&response).is_empty());
    let body = json_body(response).await;
    assert!(!body.to_string().contains("pricing table"));

    let counters = backend.counters();
    assert_eq!(counters.rolled_back, 1);
    assert_eq!(counters.in_use(), 0);

    // The single connection is usable again.
    let response = pipeline
        .process(MiddlewareContext::new(), authorized("/items"), writing_handler)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// Handler that writes and then stalls far past any client timeout.
fn stalled_handler(_ctx: &mut MiddlewareContext, _req: Request) -> BoxFuture<'static, Response> {
    Box::pin(async {
        scope::session()
            .unwrap()
            .execute("INSERT INTO orders (item_id) VALUES ($1)", &[7_i64.into()])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        Response::text(StatusCode::OK, "too late")
    })
}

#[tokio::test]
async fn test_cancelled_request_rolls_back_and_frees_connection() {
    let backend = MemoryBackend::new(1);
    let (pipeline, manager) = pipeline_with_manager(&backend, Duration::from_millis(200));

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        pipeline.process(MiddlewareContext::new(), authorized("/orders"), stalled_handler),
    )
    .await;
    assert!(outcome.is_err(), "handler should still be sleeping");

    tokio::time::sleep(Duration::from_millis(50)).await;

    let counters = backend.counters();
    assert_eq!(counters.committed, 0);
    assert_eq!(counters.rolled_back, 1);
    assert_eq!(counters.released, 1);
    assert!(backend.committed_statements().is_empty());
    assert_eq!(manager.stats().active(), 0);

    // The single connection is usable again.
    let response = pipeline
        .process(MiddlewareContext::new(), authorized("/orders"), writing_handler)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_commit_failure_is_generic_500() {
    let backend = MemoryBackend::new(1);
    backend.fail_commits(true);
    let pipeline = pipeline(&backend, Duration::from_secs(1));

    let response = pipeline
        .process(MiddlewareContext::new(), authorized("/v1/user/account/signup"), writing_handler)
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["message"], "Internal Server Error");
    assert_eq!(backend.counters().in_use(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_exhaustion_is_bounded_503() {
    const POOL: u32 = 2;
    let backend = MemoryBackend::new(POOL);
    let pipeline = Arc::new(pipeline(&backend, Duration::from_millis(150)));
    let barrier = Arc::new(tokio::sync::Barrier::new(POOL as usize + 1));

    let mut tasks = Vec::new();
    for _ in 0..=POOL {
        let pipeline = Arc::clone(&pipeline);
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            pipeline
                .process(MiddlewareContext::new(), authorized("/items"), move |_, _| {
                    Box::pin(async move {
                        let result = scope::session()
                            .unwrap()
                            .execute("UPDATE items SET views = views + 1", &[])
                            .await;
                        barrier.wait().await;
                        match result {
                            Ok(_) => Response::text(StatusCode::OK, "counted"),
                            Err(err) => Response::from_app_error(&AppError::from(err), None),
                        }
                    })
                })
                .await
        }));
    }

    let responses = tokio::time::timeout(
        Duration::from_secs(5),
        futures_util::future::join_all(tasks),
    )
    .await
    .expect("no deadlock");

    let mut statuses: Vec<StatusCode> = responses.into_iter().map(|r| r.unwrap().status()).collect();
    statuses.sort();
    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::SERVICE_UNAVAILABLE]
    );
    assert_eq!(backend.counters().in_use(), 0);
}

#[tokio::test]
async fn test_exhausted_response_advertises_retry() {
    let backend = MemoryBackend::new(1);
    let pipeline = pipeline(&backend, Duration::from_millis(20));

    // Hold the only connection outside the pipeline.
    let manager = Arc::new(SessionManager::new());
    manager.install(Arc::new(backend.clone()), Duration::from_millis(20));
    let held = manager.acquire_session().await.unwrap();

    let response = pipeline
        .process(MiddlewareContext::new(), authorized("/items"), |_, _| {
            Box::pin(async {
                match scope::session().unwrap().fetch_all("SELECT 1", &[]).await {
                    Ok(_) => Response::text(StatusCode::OK, "unexpected"),
                    Err(err) => Response::from_app_error(&AppError::from(err), None),
                }
            })
        })
        .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers().get(http::header::RETRY_AFTER).unwrap(), "1");
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    manager.release(held, false).await.unwrap();
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_correlation_id_is_stable_across_log_lines() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let backend = MemoryBackend::new(1);
    let pipeline = pipeline(&backend, Duration::from_secs(1));
    let response = pipeline
        .process(MiddlewareContext::new(), authorized("/items/42"), |_, _| {
            Box::pin(async {
                tracing::info!("looking up item");
                Response::text(StatusCode::OK, "item")
            })
        })
        .await;
    let header = request_id_header(&response);

    let raw = logs.0.lock().unwrap().clone();
    let lines: Vec<Value> = String::from_utf8(raw)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(lines.len() >= 3, "start, handler and completion lines");

    for line in &lines {
        let id = line["fields"]["request_id"]
            .as_str()
            .or_else(|| line["span"]["request_id"].as_str())
            .unwrap_or_else(|| panic!("line without request id: {line}"));
        assert_eq!(id, header);
    }
}
