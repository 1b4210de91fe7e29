//! Session lifecycle under concurrency.

use std::sync::Arc;
use std::time::Duration;

use emporio_datastore::memory::MemoryBackend;
use emporio_datastore::{DatastoreError, ScopedSession, SessionManager};

const POOL_SIZE: u32 = 3;

fn manager(backend: &MemoryBackend, acquire_timeout: Duration) -> Arc<SessionManager> {
    let manager = Arc::new(SessionManager::new());
    manager.install(Arc::new(backend.clone()), acquire_timeout);
    manager
}

#[tokio::test]
async fn test_pool_of_n_with_n_plus_one_holders_fails_one_within_deadline() {
    let backend = MemoryBackend::new(POOL_SIZE);
    let manager = manager(&backend, Duration::from_millis(100));
    let barrier = Arc::new(tokio::sync::Barrier::new(POOL_SIZE as usize + 1));

    let mut tasks = Vec::new();
    for i in 0..=POOL_SIZE {
        let scoped = ScopedSession::new(Arc::clone(&manager));
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            let result = scoped
                .execute("UPDATE items SET views = views + 1 WHERE id = $1", &[i64::from(i).into()])
                .await;
            // Hold the connection until every task has tried to get one.
            barrier.wait().await;
            let outcome = result.map(|_| ());
            scoped.finish(outcome.is_ok()).await.unwrap();
            outcome
        }));
    }

    let results = tokio::time::timeout(Duration::from_secs(5), futures_util::future::join_all(tasks))
        .await
        .expect("no deadlock");

    let mut exhausted = 0;
    let mut ok = 0;
    for result in results {
        match result.unwrap() {
            Ok(()) => ok += 1,
            Err(DatastoreError::PoolExhausted { .. }) => exhausted += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(ok, POOL_SIZE);
    assert_eq!(exhausted, 1);

    let counters = backend.counters();
    assert_eq!(counters.committed, u64::from(POOL_SIZE));
    assert_eq!(counters.in_use(), 0);
    assert_eq!(manager.stats().active(), 0);
}

#[tokio::test]
async fn test_waiter_gets_connection_once_one_is_released() {
    let backend = MemoryBackend::new(1);
    let manager = manager(&backend, Duration::from_secs(2));

    let first = ScopedSession::new(Arc::clone(&manager));
    first.execute("SELECT 1", &[]).await.unwrap();

    let second = ScopedSession::new(Arc::clone(&manager));
    let waiter = tokio::spawn(async move {
        second.execute("SELECT 2", &[]).await.map(|_| ())?;
        second.finish(true).await.map(|_| ())
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    first.finish(true).await.unwrap();
    waiter.await.unwrap().unwrap();

    assert_eq!(backend.counters().released, 2);
}

#[tokio::test]
async fn test_unreachable_database_is_a_connection_error() {
    let backend = MemoryBackend::new(1);
    let manager = manager(&backend, Duration::from_millis(50));
    backend.set_unreachable(true);

    let err = manager.ping().await.unwrap_err();
    assert!(matches!(err, DatastoreError::Connection(_)));

    let scoped = ScopedSession::new(manager);
    let err = scoped.execute("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, DatastoreError::Connection(_)));
    assert!(!scoped.finish(false).await.unwrap());
}

#[tokio::test]
async fn test_scope_dropped_mid_request_is_rolled_back() {
    let backend = MemoryBackend::new(1);
    let manager = manager(&backend, Duration::from_millis(100));

    let scoped = ScopedSession::new(Arc::clone(&manager));
    let request = tokio::spawn(async move {
        scoped
            .execute("UPDATE items SET stock = stock - 1 WHERE id = $1", &[3_i64.into()])
            .await
            .unwrap();
        std::future::pending::<()>().await;
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.stats().active(), 1);
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());
    tokio::time::sleep(Duration::from_millis(20)).await;

    let counters = backend.counters();
    assert_eq!(counters.rolled_back, 1);
    assert_eq!(counters.released, 1);
    assert_eq!(counters.in_use(), 0);
    let stats = manager.stats();
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(stats.released, 1);
    assert_eq!(stats.active(), 0);

    // The connection serves the next request.
    let next = ScopedSession::new(manager);
    next.execute("SELECT 1", &[]).await.unwrap();
    assert!(next.finish(true).await.unwrap());
}
