//! PostgreSQL backend on `sqlx`.
//!
//! Each transaction owns a raw pooled connection and drives `BEGIN`,
//! `COMMIT` and `ROLLBACK` itself so a failed commit can still be followed
//! by an explicit rollback. A connection whose rollback failed is detached
//! from the pool and closed instead of being reused.

use std::time::{Duration, Instant};

use emporio_core::millis;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Postgres, Row as _, TypeInfo, ValueRef};

use crate::backend::{DatabasePool, DatabaseTransaction, PoolStats};
use crate::{DatastoreError, DatastoreResult, DbValue, PoolConfig, Row};

/// Pool of PostgreSQL connections.
#[derive(Debug, Clone)]
pub struct PostgresPool {
    pool: PgPool,
    config: PoolConfig,
}

impl PostgresPool {
    /// Connects to `dsn` and opens `min_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns `DatastoreError::Configuration` for a non-PostgreSQL DSN and
    /// `DatastoreError::Connection` if the server cannot be reached.
    pub async fn connect(dsn: &str, config: &PoolConfig) -> DatastoreResult<Self> {
        if !dsn.starts_with("postgresql://") && !dsn.starts_with("postgres://") {
            return Err(DatastoreError::Configuration(
                "invalid PostgreSQL URL scheme".to_string(),
            ));
        }

        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .test_before_acquire(config.test_before_acquire);

        if let Some(idle_timeout) = config.idle_timeout {
            options = options.idle_timeout(idle_timeout);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            options = options.max_lifetime(max_lifetime);
        }

        let pool = options
            .connect(dsn)
            .await
            .map_err(|e| DatastoreError::Connection(format!("failed to create pool: {e}")))?;

        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    fn map_acquire_error(&self, err: sqlx::Error) -> DatastoreError {
        match err {
            sqlx::Error::PoolTimedOut => DatastoreError::PoolExhausted {
                waited_ms: millis(self.config.acquire_timeout),
            },
            sqlx::Error::PoolClosed => DatastoreError::PoolClosed,
            other => DatastoreError::Connection(other.to_string()),
        }
    }
}

impl DatabasePool for PostgresPool {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn begin(&self) -> BoxFuture<'_, DatastoreResult<Box<dyn DatabaseTransaction>>> {
        async move {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| self.map_acquire_error(e))?;

            sqlx::query("BEGIN")
                .execute(&mut *conn)
                .await
                .map_err(|e| DatastoreError::Connection(format!("BEGIN failed: {e}")))?;

            Ok(Box::new(PostgresTransaction {
                conn: Some(conn),
                open: true,
                poisoned: false,
            }) as Box<dyn DatabaseTransaction>)
        }
        .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, DatastoreResult<Duration>> {
        async move {
            let start = Instant::now();
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| match e {
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                        self.map_acquire_error(e)
                    }
                    other => DatastoreError::Connection(other.to_string()),
                })?;
            Ok(start.elapsed())
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.pool.close().boxed()
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX),
            max_connections: self.config.max_connections,
        }
    }
}

/// Open transaction on a checked-out connection.
struct PostgresTransaction {
    conn: Option<PoolConnection<Postgres>>,
    open: bool,
    poisoned: bool,
}

impl PostgresTransaction {
    fn conn(&mut self) -> DatastoreResult<&mut PoolConnection<Postgres>> {
        self.conn.as_mut().ok_or(DatastoreError::SessionFinished)
    }
}

impl DatabaseTransaction for PostgresTransaction {
    fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [DbValue],
    ) -> BoxFuture<'a, DatastoreResult<u64>> {
        async move {
            let conn = self.conn()?;
            let result = bind_all(sqlx::query(sql), params)
                .execute(&mut **conn)
                .await
                .map_err(|e| DatastoreError::Query(e.to_string()))?;
            Ok(result.rows_affected())
        }
        .boxed()
    }

    fn fetch_all<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [DbValue],
    ) -> BoxFuture<'a, DatastoreResult<Vec<Row>>> {
        async move {
            let conn = self.conn()?;
            let rows = bind_all(sqlx::query(sql), params)
                .fetch_all(&mut **conn)
                .await
                .map_err(|e| DatastoreError::Query(e.to_string()))?;
            rows.iter().map(row_to_map).collect()
        }
        .boxed()
    }

    fn fetch_optional<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [DbValue],
    ) -> BoxFuture<'a, DatastoreResult<Option<Row>>> {
        async move {
            let conn = self.conn()?;
            let row = bind_all(sqlx::query(sql), params)
                .fetch_optional(&mut **conn)
                .await
                .map_err(|e| DatastoreError::Query(e.to_string()))?;
            row.as_ref().map(row_to_map).transpose()
        }
        .boxed()
    }

    fn commit(&mut self) -> BoxFuture<'_, DatastoreResult<()>> {
        async move {
            let conn = self.conn()?;
            sqlx::query("COMMIT")
                .execute(&mut **conn)
                .await
                .map_err(|e| DatastoreError::Commit(e.to_string()))?;
            self.open = false;
            Ok(())
        }
        .boxed()
    }

    fn rollback(&mut self) -> BoxFuture<'_, DatastoreResult<()>> {
        async move {
            let conn = self.conn()?;
            let result = sqlx::query("ROLLBACK").execute(&mut **conn).await;
            match result {
                Ok(_) => {
                    self.open = false;
                    Ok(())
                }
                Err(e) => {
                    self.poisoned = true;
                    Err(DatastoreError::Rollback(e.to_string()))
                }
            }
        }
        .boxed()
    }

    fn release(mut self: Box<Self>) -> BoxFuture<'static, ()> {
        let conn = self.conn.take();
        let discard = self.poisoned || self.open;
        async move {
            let Some(conn) = conn else { return };
            if discard {
                // Never hand a connection with unknown transaction state to
                // the next request.
                if let Err(e) = conn.detach().close().await {
                    tracing::debug!(error = %e, "Closing discarded connection failed");
                }
            }
        }
        .boxed()
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        // Dropped without `release`: an open BEGIN must not reach the pool.
        if self.open || self.poisoned {
            if let Some(conn) = self.conn.take() {
                drop(conn.detach());
            }
        }
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [DbValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            DbValue::Null => query.bind(Option::<String>::None),
            DbValue::Bool(v) => query.bind(*v),
            DbValue::Int64(v) => query.bind(*v),
            DbValue::Float64(v) => query.bind(*v),
            DbValue::Text(v) => query.bind(v.as_str()),
            DbValue::Uuid(v) => query.bind(*v),
            DbValue::Timestamp(v) => query.bind(*v),
            DbValue::Json(v) => query.bind(v),
        };
    }
    query
}

fn row_to_map(row: &PgRow) -> DatastoreResult<Row> {
    let mut map = Row::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, index)?);
    }
    Ok(map)
}

fn column_value(row: &PgRow, index: usize) -> DatastoreResult<DbValue> {
    let decode = |e: sqlx::Error| DatastoreError::Query(format!("column {index}: {e}"));

    let raw = row.try_get_raw(index).map_err(decode)?;
    if raw.is_null() {
        return Ok(DbValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => DbValue::Bool(row.try_get(index).map_err(decode)?),
        "INT2" => DbValue::Int64(i64::from(row.try_get::<i16, _>(index).map_err(decode)?)),
        "INT4" => DbValue::Int64(i64::from(row.try_get::<i32, _>(index).map_err(decode)?)),
        "INT8" => DbValue::Int64(row.try_get(index).map_err(decode)?),
        "FLOAT4" => DbValue::Float64(f64::from(row.try_get::<f32, _>(index).map_err(decode)?)),
        "FLOAT8" => DbValue::Float64(row.try_get(index).map_err(decode)?),
        "UUID" => DbValue::Uuid(row.try_get(index).map_err(decode)?),
        "TIMESTAMPTZ" => DbValue::Timestamp(row.try_get(index).map_err(decode)?),
        "TIMESTAMP" => {
            let naive: chrono::NaiveDateTime = row.try_get(index).map_err(decode)?;
            DbValue::Timestamp(naive.and_utc())
        }
        "JSON" | "JSONB" => DbValue::Json(row.try_get(index).map_err(decode)?),
        _ => DbValue::Text(row.try_get(index).map_err(|e| {
            DatastoreError::Query(format!("unsupported column type '{type_name}': {e}"))
        })?),
    };
    Ok(value)
}
