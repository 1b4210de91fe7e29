//! # Emporio Datastore
//!
//! Connection pool lifecycle and request-scoped transactional sessions.
//!
//! - [`SessionManager`] - owns the pool; `init_pool`, `dispose_pool`,
//!   `acquire_session`, `release`, `ping`
//! - [`Session`] - one connection with an open transaction
//! - [`ScopedSession`] - per-request handle that acquires lazily and is
//!   finished exactly once by the session stage
//! - [`postgres::PostgresPool`] - `sqlx` PostgreSQL backend
//! - [`memory::MemoryBackend`] - bounded in-memory backend with counters
//!
//! # Example
//!
//! ```no_run
//! use emporio_datastore::{PoolConfig, SessionManager};
//!
//! # async fn run() -> Result<(), emporio_datastore::DatastoreError> {
//! let manager = SessionManager::new();
//! manager.init_pool("postgres://app@localhost/emporio", &PoolConfig::default()).await?;
//!
//! let mut session = manager.acquire_session().await?;
//! session.execute("UPDATE items SET stock = stock - 1 WHERE id = $1", &[42_i64.into()]).await?;
//! manager.release(session, true).await?;
//!
//! manager.dispose_pool().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod backend;
mod error;
mod manager;
pub mod memory;
pub mod postgres;
mod scoped;
mod value;

pub use backend::{DatabasePool, DatabaseTransaction, PoolStats};
pub use error::{DatastoreError, DatastoreResult, POOL_EXHAUSTED_RETRY_AFTER_SECS};
pub use manager::{ManagerStats, PoolConfig, Session, SessionManager};
pub use scoped::ScopedSession;
pub use value::{DbValue, Row};
