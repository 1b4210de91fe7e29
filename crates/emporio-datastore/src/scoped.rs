//! Lazily acquired, request-bound session.
//!
//! A [`ScopedSession`] is created for every request but only checks out a
//! connection the first time a statement runs. Requests that never touch the
//! database never hold a connection.
//!
//! If the last handle is dropped while a session is still held (the request
//! future was cancelled or timed out), the session is rolled back and
//! released in the background.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{DatastoreError, DatastoreResult, DbValue, Row, Session, SessionManager};

#[derive(Debug)]
enum ScopeState {
    Idle,
    Active(Session),
    Finished,
}

#[derive(Debug)]
struct ScopeCell {
    manager: Arc<SessionManager>,
    state: Mutex<ScopeState>,
}

impl Drop for ScopeCell {
    fn drop(&mut self) {
        let ScopeState::Active(session) =
            std::mem::replace(self.state.get_mut(), ScopeState::Finished)
        else {
            return;
        };

        tracing::warn!("Request scope dropped with an open session, rolling back");
        let manager = Arc::clone(&self.manager);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = manager.release(session, false).await {
                        tracing::warn!(error = %e, "Releasing abandoned session failed");
                    }
                });
            }
            Err(_) => manager.abandon(session),
        }
    }
}

/// Request-bound handle to at most one [`Session`].
///
/// Clones share the same session; statements from clones are serialized.
#[derive(Debug, Clone)]
pub struct ScopedSession {
    cell: Arc<ScopeCell>,
}

impl ScopedSession {
    /// Creates an idle scope. No connection is checked out yet.
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            cell: Arc::new(ScopeCell {
                manager,
                state: Mutex::new(ScopeState::Idle),
            }),
        }
    }

    /// Whether a connection has been checked out and not yet released.
    pub async fn is_acquired(&self) -> bool {
        matches!(*self.cell.state.lock().await, ScopeState::Active(_))
    }

    /// Executes a statement, acquiring the session first if needed.
    pub async fn execute(&self, sql: &str, params: &[DbValue]) -> DatastoreResult<u64> {
        let mut state = self.cell.state.lock().await;
        self.session(&mut state).await?.execute(sql, params).await
    }

    /// Runs a query and returns every row.
    pub async fn fetch_all(&self, sql: &str, params: &[DbValue]) -> DatastoreResult<Vec<Row>> {
        let mut state = self.cell.state.lock().await;
        self.session(&mut state).await?.fetch_all(sql, params).await
    }

    /// Runs a query and returns the first row, if any.
    pub async fn fetch_optional(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> DatastoreResult<Option<Row>> {
        let mut state = self.cell.state.lock().await;
        self.session(&mut state)
            .await?
            .fetch_optional(sql, params)
            .await
    }

    async fn session<'s>(&self, state: &'s mut ScopeState) -> DatastoreResult<&'s mut Session> {
        if matches!(state, ScopeState::Idle) {
            *state = ScopeState::Active(self.cell.manager.acquire_session().await?);
        }
        match state {
            ScopeState::Active(session) => Ok(session),
            ScopeState::Idle | ScopeState::Finished => Err(DatastoreError::SessionFinished),
        }
    }

    /// Ends the scope: commits or rolls back the session if one was
    /// acquired, and returns its connection. Later statements fail.
    ///
    /// Returns `Ok(false)` when no session was ever acquired.
    ///
    /// # Errors
    ///
    /// Propagates a commit failure from [`SessionManager::release`].
    pub async fn finish(&self, success: bool) -> DatastoreResult<bool> {
        let previous = std::mem::replace(&mut *self.cell.state.lock().await, ScopeState::Finished);
        match previous {
            ScopeState::Active(session) => {
                self.cell.manager.release(session, success).await?;
                Ok(true)
            }
            ScopeState::Idle | ScopeState::Finished => Ok(false),
        }
    }
}
