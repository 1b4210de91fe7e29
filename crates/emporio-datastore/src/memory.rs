//! In-memory backend for tests and local runs without PostgreSQL.
//!
//! Connections are semaphore permits, so a pool of `N` blocks the `N+1`th
//! `begin` exactly like a real pool. Statements are recorded, not executed:
//! `execute` reports one affected row and queries return the rows scripted
//! with [`MemoryBackend::script_rows`].
//!
//! ```
//! use emporio_datastore::memory::MemoryBackend;
//!
//! let backend = MemoryBackend::new(2);
//! assert_eq!(backend.counters().begun, 0);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::backend::{DatabasePool, DatabaseTransaction, PoolStats};
use crate::{DatastoreError, DatastoreResult, DbValue, Row};

/// Snapshot of what the backend has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryCounters {
    /// Transactions begun (connections checked out).
    pub begun: u64,
    /// Successful commits.
    pub committed: u64,
    /// Successful rollbacks.
    pub rolled_back: u64,
    /// Connections returned.
    pub released: u64,
    /// Commits that were made to fail.
    pub failed_commits: u64,
}

impl MemoryCounters {
    /// Connections currently checked out.
    #[must_use]
    pub const fn in_use(&self) -> u64 {
        self.begun.saturating_sub(self.released)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    released: AtomicU64,
    failed_commits: AtomicU64,
    fail_commits: AtomicBool,
    fail_rollbacks: AtomicBool,
    unreachable: AtomicBool,
    closed: AtomicBool,
    failing_statement: Mutex<Option<String>>,
    scripted_rows: Mutex<Vec<(String, Vec<Row>)>>,
    statements: Mutex<Vec<String>>,
    committed_statements: Mutex<Vec<String>>,
}

impl MemoryState {
    fn check_statement(&self, sql: &str) -> DatastoreResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(DatastoreError::Connection("server closed the connection".into()));
        }
        if let Some(pattern) = self.failing_statement.lock().as_deref() {
            if sql.contains(pattern) {
                return Err(DatastoreError::Query(format!("statement rejected: {sql}")));
            }
        }
        self.statements.lock().push(sql.to_string());
        Ok(())
    }

    fn rows_for(&self, sql: &str) -> Vec<Row> {
        self.scripted_rows
            .lock()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

/// Semaphore-bounded in-memory pool.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    permits: Arc<Semaphore>,
    max_connections: u32,
    state: Arc<MemoryState>,
}

impl MemoryBackend {
    /// Creates a pool with `max_connections` connections.
    #[must_use]
    pub fn new(max_connections: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_connections as usize)),
            max_connections,
            state: Arc::new(MemoryState::default()),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn counters(&self) -> MemoryCounters {
        let s = &self.state;
        MemoryCounters {
            begun: s.begun.load(Ordering::SeqCst),
            committed: s.committed.load(Ordering::SeqCst),
            rolled_back: s.rolled_back.load(Ordering::SeqCst),
            released: s.released.load(Ordering::SeqCst),
            failed_commits: s.failed_commits.load(Ordering::SeqCst),
        }
    }

    /// Every statement executed, in order, committed or not.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state.statements.lock().clone()
    }

    /// Statements belonging to committed transactions.
    #[must_use]
    pub fn committed_statements(&self) -> Vec<String> {
        self.state.committed_statements.lock().clone()
    }

    /// Makes every subsequent commit fail.
    pub fn fail_commits(&self, fail: bool) {
        self.state.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent rollback fail.
    pub fn fail_rollbacks(&self, fail: bool) {
        self.state.fail_rollbacks.store(fail, Ordering::SeqCst);
    }

    /// Simulates losing the database server.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Makes statements containing `pattern` fail with a query error.
    pub fn fail_statements_containing(&self, pattern: impl Into<String>) {
        *self.state.failing_statement.lock() = Some(pattern.into());
    }

    /// Rows returned by queries whose SQL contains `pattern`.
    pub fn script_rows(&self, pattern: impl Into<String>, rows: Vec<Row>) {
        self.state.scripted_rows.lock().push((pattern.into(), rows));
    }
}

impl DatabasePool for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn begin(&self) -> BoxFuture<'_, DatastoreResult<Box<dyn DatabaseTransaction>>> {
        async move {
            if self.state.closed.load(Ordering::SeqCst) {
                return Err(DatastoreError::PoolClosed);
            }
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|_| DatastoreError::PoolClosed)?;
            if self.state.unreachable.load(Ordering::SeqCst) {
                return Err(DatastoreError::Connection("connection refused".into()));
            }
            self.state.begun.fetch_add(1, Ordering::SeqCst);

            Ok(Box::new(MemoryTransaction {
                state: Arc::clone(&self.state),
                permit: Some(permit),
                pending: Vec::new(),
                open: true,
            }) as Box<dyn DatabaseTransaction>)
        }
        .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, DatastoreResult<Duration>> {
        async move {
            if self.state.closed.load(Ordering::SeqCst) {
                return Err(DatastoreError::PoolClosed);
            }
            if self.state.unreachable.load(Ordering::SeqCst) {
                return Err(DatastoreError::Connection("connection refused".into()));
            }
            Ok(Duration::ZERO)
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        async move {
            self.state.closed.store(true, Ordering::SeqCst);
            self.permits.close();
        }
        .boxed()
    }

    fn stats(&self) -> PoolStats {
        let idle = u32::try_from(self.permits.available_permits()).unwrap_or(u32::MAX);
        PoolStats {
            size: self.max_connections,
            idle,
            max_connections: self.max_connections,
        }
    }
}

struct MemoryTransaction {
    state: Arc<MemoryState>,
    permit: Option<OwnedSemaphorePermit>,
    pending: Vec<String>,
    open: bool,
}

impl MemoryTransaction {
    fn record(&mut self, sql: &str) -> DatastoreResult<()> {
        if !self.open {
            return Err(DatastoreError::SessionFinished);
        }
        self.state.check_statement(sql)?;
        self.pending.push(sql.to_string());
        Ok(())
    }
}

impl DatabaseTransaction for MemoryTransaction {
    fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        _params: &'a [DbValue],
    ) -> BoxFuture<'a, DatastoreResult<u64>> {
        async move {
            self.record(sql)?;
            Ok(1)
        }
        .boxed()
    }

    fn fetch_all<'a>(
        &'a mut self,
        sql: &'a str,
        _params: &'a [DbValue],
    ) -> BoxFuture<'a, DatastoreResult<Vec<Row>>> {
        async move {
            self.record(sql)?;
            Ok(self.state.rows_for(sql))
        }
        .boxed()
    }

    fn fetch_optional<'a>(
        &'a mut self,
        sql: &'a str,
        _params: &'a [DbValue],
    ) -> BoxFuture<'a, DatastoreResult<Option<Row>>> {
        async move {
            self.record(sql)?;
            Ok(self.state.rows_for(sql).into_iter().next())
        }
        .boxed()
    }

    fn commit(&mut self) -> BoxFuture<'_, DatastoreResult<()>> {
        async move {
            if self.state.fail_commits.load(Ordering::SeqCst) {
                self.state.failed_commits.fetch_add(1, Ordering::SeqCst);
                return Err(DatastoreError::Commit(
                    "could not serialize access due to concurrent update".into(),
                ));
            }
            self.open = false;
            self.state
                .committed_statements
                .lock()
                .append(&mut self.pending);
            self.state.committed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn rollback(&mut self) -> BoxFuture<'_, DatastoreResult<()>> {
        async move {
            if self.state.fail_rollbacks.load(Ordering::SeqCst) {
                return Err(DatastoreError::Rollback("connection reset".into()));
            }
            self.open = false;
            self.pending.clear();
            self.state.rolled_back.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn release(mut self: Box<Self>) -> BoxFuture<'static, ()> {
        let permit = self.permit.take();
        let state = Arc::clone(&self.state);
        async move {
            drop(permit);
            state.released.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.permit.take().is_some() {
            self.state.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_commit_release() {
        let backend = MemoryBackend::new(1);
        let mut tx = backend.begin().await.unwrap();
        tx.execute("INSERT INTO users VALUES ($1)", &[DbValue::from("a")])
            .await
            .unwrap();
        assert_eq!(backend.stats().in_use(), 1);

        tx.commit().await.unwrap();
        tx.release().await;

        let counters = backend.counters();
        assert_eq!(counters.begun, 1);
        assert_eq!(counters.committed, 1);
        assert_eq!(counters.released, 1);
        assert_eq!(counters.in_use(), 0);
        assert_eq!(backend.committed_statements().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_pending() {
        let backend = MemoryBackend::new(1);
        let mut tx = backend.begin().await.unwrap();
        tx.execute("DELETE FROM users", &[]).await.unwrap();
        tx.rollback().await.unwrap();
        tx.release().await;

        assert_eq!(backend.statements().len(), 1);
        assert!(backend.committed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_pool_blocks() {
        let backend = MemoryBackend::new(1);
        let held = backend.begin().await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(50), backend.begin()).await;
        assert!(waiting.is_err(), "second begin should block");

        held.release().await;
        let again = tokio::time::timeout(Duration::from_millis(50), backend.begin()).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_failing_statement() {
        let backend = MemoryBackend::new(1);
        backend.fail_statements_containing("app_user");
        let mut tx = backend.begin().await.unwrap();
        let err = tx.execute("SELECT * FROM app_user", &[]).await.unwrap_err();
        assert!(matches!(err, DatastoreError::Query(_)));
    }

    #[tokio::test]
    async fn test_scripted_rows() {
        let backend = MemoryBackend::new(1);
        let mut row = Row::new();
        row.insert("id".to_string(), DbValue::from(1_i64));
        backend.script_rows("FROM items", vec![row]);

        let mut tx = backend.begin().await.unwrap();
        let rows = tx.fetch_all("SELECT id FROM items", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(tx.fetch_optional("SELECT 1", &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_pool() {
        let backend = MemoryBackend::new(1);
        backend.close().await;
        assert!(matches!(backend.begin().await, Err(DatastoreError::PoolClosed)));
        assert!(backend.ping().await.is_err());
    }
}
