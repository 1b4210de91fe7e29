//! Backend abstraction.
//!
//! A [`DatabasePool`] hands out [`DatabaseTransaction`]s: one pooled
//! connection with an open transaction. The [`SessionManager`] drives them
//! through commit or rollback and release; backends only implement the
//! primitives.
//!
//! [`SessionManager`]: crate::SessionManager

use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::{DatastoreResult, DbValue, Row};

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently open.
    pub size: u32,
    /// Open connections not checked out.
    pub idle: u32,
    /// Configured upper bound.
    pub max_connections: u32,
}

impl PoolStats {
    /// Connections currently checked out.
    #[must_use]
    pub const fn in_use(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }
}

/// A connection pool shared by all requests.
pub trait DatabasePool: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Checks out a connection and begins a transaction on it.
    ///
    /// May wait for a free connection; the caller bounds the wait.
    fn begin(&self) -> BoxFuture<'_, DatastoreResult<Box<dyn DatabaseTransaction>>>;

    /// Runs a trivial query outside any request transaction and returns its
    /// round-trip time.
    fn ping(&self) -> BoxFuture<'_, DatastoreResult<Duration>>;

    /// Closes every connection. Later `begin` calls fail with `PoolClosed`.
    fn close(&self) -> BoxFuture<'_, ()>;

    /// Current occupancy.
    fn stats(&self) -> PoolStats;
}

/// A checked-out connection with an open transaction.
pub trait DatabaseTransaction: Send {
    /// Executes a statement and returns the affected row count.
    fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [DbValue],
    ) -> BoxFuture<'a, DatastoreResult<u64>>;

    /// Runs a query and returns every row.
    fn fetch_all<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [DbValue],
    ) -> BoxFuture<'a, DatastoreResult<Vec<Row>>>;

    /// Runs a query and returns the first row, if any.
    fn fetch_optional<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [DbValue],
    ) -> BoxFuture<'a, DatastoreResult<Option<Row>>>;

    /// Commits. On failure the transaction stays open so it can be rolled back.
    fn commit(&mut self) -> BoxFuture<'_, DatastoreResult<()>>;

    /// Rolls back.
    fn rollback(&mut self) -> BoxFuture<'_, DatastoreResult<()>>;

    /// Returns the connection to the pool. Must be called exactly once.
    fn release(self: Box<Self>) -> BoxFuture<'static, ()>;
}
