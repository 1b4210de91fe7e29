//! Process-wide session manager.
//!
//! Owns the connection pool. `init_pool`/`dispose_pool` run once at startup
//! and shutdown; `acquire_session`/`release` run once per data-accessing
//! request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use emporio_core::millis;
use parking_lot::RwLock;

use crate::backend::{DatabasePool, DatabaseTransaction, PoolStats};
use crate::postgres::PostgresPool;
use crate::{DatastoreError, DatastoreResult, DbValue, Row};

/// Connection pool options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum open connections.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
    /// Bounded wait for a free connection.
    pub acquire_timeout: Duration,
    /// Close connections idle for longer than this.
    pub idle_timeout: Option<Duration>,
    /// Recycle connections older than this.
    pub max_lifetime: Option<Duration>,
    /// Ping a connection before handing it out.
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            test_before_acquire: true,
        }
    }
}

/// One unit of work: a checked-out connection with an open transaction.
///
/// Owned by exactly one request. Hand it back with
/// [`SessionManager::release`].
pub struct Session {
    tx: Box<dyn DatabaseTransaction>,
    active: bool,
    acquired_at: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("active", &self.active)
            .field("age", &self.acquired_at.elapsed())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Whether the transaction is still open.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Executes a statement and returns the affected row count.
    pub async fn execute(&mut self, sql: &str, params: &[DbValue]) -> DatastoreResult<u64> {
        self.ensure_active()?;
        self.tx.execute(sql, params).await
    }

    /// Runs a query and returns every row.
    pub async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> DatastoreResult<Vec<Row>> {
        self.ensure_active()?;
        self.tx.fetch_all(sql, params).await
    }

    /// Runs a query and returns the first row, if any.
    pub async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[DbValue],
    ) -> DatastoreResult<Option<Row>> {
        self.ensure_active()?;
        self.tx.fetch_optional(sql, params).await
    }

    fn ensure_active(&self) -> DatastoreResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(DatastoreError::SessionFinished)
        }
    }
}

/// Session counters plus pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Sessions handed out.
    pub acquired: u64,
    /// Sessions whose connection went back to the pool.
    pub released: u64,
    /// Successful commits.
    pub committed: u64,
    /// Successful rollbacks.
    pub rolled_back: u64,
    /// Acquire attempts that hit the deadline.
    pub exhausted: u64,
    /// Pool occupancy, when a pool is installed.
    pub pool: Option<PoolStats>,
}

impl ManagerStats {
    /// Sessions acquired and not yet released.
    #[must_use]
    pub const fn active(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

struct Installed {
    pool: Arc<dyn DatabasePool>,
    acquire_timeout: Duration,
}

/// Owns the pool and the commit-or-rollback-then-release protocol.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use emporio_datastore::{memory::MemoryBackend, SessionManager};
///
/// # tokio_test::block_on(async {
/// let manager = SessionManager::new();
/// manager.install(Arc::new(MemoryBackend::new(2)), Duration::from_secs(1));
///
/// let mut session = manager.acquire_session().await.unwrap();
/// session.execute("UPDATE items SET stock = stock - 1", &[]).await.unwrap();
/// manager.release(session, true).await.unwrap();
///
/// assert_eq!(manager.stats().committed, 1);
/// # });
/// ```
pub struct SessionManager {
    installed: RwLock<Option<Installed>>,
    acquired: AtomicU64,
    released: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    exhausted: AtomicU64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("initialized", &self.is_initialized())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Creates a manager with no pool installed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            installed: RwLock::new(None),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    /// Connects a PostgreSQL pool and installs it.
    ///
    /// # Errors
    ///
    /// Returns `DatastoreError::Configuration` for an invalid DSN and
    /// `DatastoreError::Connection` if the database cannot be reached.
    pub async fn init_pool(&self, dsn: &str, config: &PoolConfig) -> DatastoreResult<()> {
        let pool = PostgresPool::connect(dsn, config).await?;
        self.install(Arc::new(pool), config.acquire_timeout);
        tracing::info!(
            max_connections = config.max_connections,
            acquire_timeout_ms = millis(config.acquire_timeout),
            "Database pool initialized"
        );
        Ok(())
    }

    /// Installs an already-built pool, replacing any previous one.
    pub fn install(&self, pool: Arc<dyn DatabasePool>, acquire_timeout: Duration) {
        *self.installed.write() = Some(Installed {
            pool,
            acquire_timeout,
        });
    }

    /// Whether a pool is installed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.installed.read().is_some()
    }

    /// Closes the pool. Idempotent.
    pub async fn dispose_pool(&self) {
        let installed = self.installed.write().take();
        if let Some(installed) = installed {
            installed.pool.close().await;
            tracing::info!(
                backend = installed.pool.backend_name(),
                "Database pool disposed"
            );
        }
    }

    fn pool(&self) -> DatastoreResult<(Arc<dyn DatabasePool>, Duration)> {
        self.installed
            .read()
            .as_ref()
            .map(|i| (Arc::clone(&i.pool), i.acquire_timeout))
            .ok_or(DatastoreError::NotInitialized)
    }

    /// Checks out a connection and begins a transaction.
    ///
    /// Waits at most the configured acquire timeout.
    ///
    /// # Errors
    ///
    /// `PoolExhausted` when the deadline passes, `NotInitialized` without a
    /// pool, `Connection` when the database is unreachable.
    pub async fn acquire_session(&self) -> DatastoreResult<Session> {
        let (pool, acquire_timeout) = self.pool()?;

        let tx = match tokio::time::timeout(acquire_timeout, pool.begin()).await {
            Ok(Ok(tx)) => tx,
            Ok(Err(e)) => {
                if matches!(e, DatastoreError::PoolExhausted { .. }) {
                    self.exhausted.fetch_add(1, Ordering::Relaxed);
                }
                return Err(e);
            }
            Err(_) => {
                self.exhausted.fetch_add(1, Ordering::Relaxed);
                return Err(DatastoreError::PoolExhausted {
                    waited_ms: millis(acquire_timeout),
                });
            }
        };

        self.acquired.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Session acquired");

        Ok(Session {
            tx,
            active: true,
            acquired_at: Instant::now(),
        })
    }

    /// Ends a session: commits when `success` and still active, otherwise
    /// rolls back. The connection goes back to the pool in every case.
    ///
    /// # Errors
    ///
    /// Returns the commit error when a commit was attempted and failed; the
    /// rollback that follows it is attempted first. A failed rollback is
    /// only logged so it never masks the failure that caused it.
    pub async fn release(&self, mut session: Session, success: bool) -> DatastoreResult<()> {
        let outcome = if session.active && success {
            match session.tx.commit().await {
                Ok(()) => {
                    self.committed.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(commit_err) => {
                    tracing::error!(error = %commit_err, "Commit failed, rolling back");
                    self.rollback_quietly(&mut session).await;
                    Err(commit_err)
                }
            }
        } else {
            if session.active {
                self.rollback_quietly(&mut session).await;
            }
            Ok(())
        };

        session.active = false;
        session.tx.release().await;
        self.released.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            held_ms = millis(session.acquired_at.elapsed()),
            committed = outcome.is_ok() && success,
            "Session released"
        );

        outcome
    }

    /// Gives up a session without a runtime to roll it back on.
    ///
    /// The transaction is dropped, which discards its connection; the
    /// database aborts the open transaction when the connection closes.
    pub(crate) fn abandon(&self, mut session: Session) {
        session.active = false;
        drop(session);
        self.released.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Session abandoned");
    }

    async fn rollback_quietly(&self, session: &mut Session) {
        match session.tx.rollback().await {
            Ok(()) => {
                self.rolled_back.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rollback failed");
            }
        }
    }

    /// Runs `SELECT 1` outside any request transaction.
    ///
    /// # Errors
    ///
    /// `NotInitialized` without a pool, or the backend's connectivity error.
    pub async fn ping(&self) -> DatastoreResult<Duration> {
        let (pool, acquire_timeout) = self.pool()?;
        match tokio::time::timeout(acquire_timeout, pool.ping()).await {
            Ok(result) => result,
            Err(_) => Err(DatastoreError::PoolExhausted {
                waited_ms: millis(acquire_timeout),
            }),
        }
    }

    /// Session counters and pool occupancy.
    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            pool: self.installed.read().as_ref().map(|i| i.pool.stats()),
        }
    }
}
