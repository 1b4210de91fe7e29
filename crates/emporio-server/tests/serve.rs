//! Serving over a real socket.

use std::sync::Arc;
use std::time::Duration;

use emporio_config::ServerConfig;
use emporio_datastore::memory::MemoryBackend;
use emporio_datastore::SessionManager;
use emporio_middleware::Pipeline;
use emporio_server::{HandlerContext, HandlerRegistry, Server, ShutdownSignal};
use http::Method;
use serde_json::{json, Value};
use tokio::net::TcpListener;

struct Running {
    base: String,
    shutdown: ShutdownSignal,
    manager: Arc<SessionManager>,
    task: tokio::task::JoinHandle<Result<(), emporio_server::ServerError>>,
}

async fn start() -> Running {
    let manager = Arc::new(SessionManager::new());
    manager.install(Arc::new(MemoryBackend::new(2)), Duration::from_millis(100));

    let mut handlers = HandlerRegistry::new();
    handlers.register_no_body("health", |_ctx| async { Ok(json!({ "status": "ok" })) });
    handlers.register_no_body("nap", |ctx: HandlerContext| async move {
        let ms: u64 = ctx.parse_param("ms")?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    });

    let server = Server::builder()
        .config(ServerConfig {
            shutdown_timeout_secs: 5,
            ..ServerConfig::default()
        })
        .route(Method::GET, "/health", "health")
        .route(Method::GET, "/nap/{ms}", "nap")
        .handlers(handlers)
        .pipeline(
            Pipeline::builder()
                .session_manager(Arc::clone(&manager))
                .build(),
        )
        .session_manager(Arc::clone(&manager))
        .build();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = ShutdownSignal::new();
    let task = tokio::spawn(server.serve(listener, shutdown.clone()));

    Running {
        base,
        shutdown,
        manager,
        task,
    }
}

#[tokio::test]
async fn test_requests_over_http() {
    let running = start().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", running.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.json::<Value>().await.unwrap()["status"], "ok");

    let response = client
        .post(format!("{}/health", running.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
    assert_eq!(response.headers()["allow"], "GET");

    let response = client
        .get(format!("{}/nowhere", running.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    running.shutdown.trigger();
    running.task.await.unwrap().unwrap();
    assert!(!running.manager.is_initialized());
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_request_finish() {
    let running = start().await;
    let url = format!("{}/nap/300", running.base);

    let in_flight = tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    running.shutdown.trigger();

    let response = in_flight.await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap()["slept_ms"], 300);

    tokio::time::timeout(Duration::from_secs(5), running.task)
        .await
        .expect("server stops after drain")
        .unwrap()
        .unwrap();
    assert!(!running.manager.is_initialized());
}
