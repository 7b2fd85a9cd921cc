//! Runs guard-approved queries against the read-only analytics database.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use insights_core::config::QueryConfig;
use insights_core::domain::query::QueryResult;
use insights_core::errors::{ExecutionError, QueryError};
use insights_core::guard::{SanitizedQuery, SqlGuard};
use serde_json::{Number, Value};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::DbPool;

/// The database boundary seen by the agent. Implementations must never be
/// able to write.
#[async_trait]
pub trait ReadOnlySource: Send + Sync {
    async fn execute(
        &self,
        query: &SanitizedQuery,
        timeout: Duration,
    ) -> Result<QueryResult, ExecutionError>;
}

/// [`ReadOnlySource`] over a pool built by [`crate::connect_read_only`].
#[derive(Clone, Debug)]
pub struct SqliteReadOnlySource {
    pool: DbPool,
}

/// VM instructions between deadline checks.
const PROGRESS_CHECK_OPS: i32 = 1_000;

/// Extra time the async backstop allows the interrupt to land.
const BACKSTOP_GRACE: Duration = Duration::from_secs(1);

impl SqliteReadOnlySource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Runs one statement with a deadline enforced inside SQLite: a progress
    /// handler aborts the VM once the deadline passes, so a runaway query
    /// releases its connection instead of holding it past the timeout.
    async fn run(&self, sql: &str, timeout: Duration) -> Result<QueryResult, ExecutionError> {
        let mut conn = self.pool.acquire().await.map_err(database_error)?;
        sqlx::query(&format!("PRAGMA busy_timeout = {}", timeout.as_millis()))
            .execute(&mut *conn)
            .await
            .map_err(database_error)?;

        // Replaces any handler left behind by an abandoned earlier call.
        let deadline = Instant::now() + timeout;
        conn.lock_handle()
            .await
            .map_err(database_error)?
            .set_progress_handler(PROGRESS_CHECK_OPS, move || Instant::now() < deadline);

        match fetch(&mut conn, sql).await {
            Ok(result) => {
                conn.lock_handle().await.map_err(database_error)?.remove_progress_handler();
                Ok(result)
            }
            Err(error) if Instant::now() >= deadline => {
                warn!(
                    event_name = "query.statement_interrupted",
                    timeout_ms = timeout.as_millis() as u64,
                    error = %error,
                    "statement exceeded its deadline and was interrupted"
                );
                // Never hand an interrupted connection back to the pool.
                if let Err(close_error) = conn.detach().close().await {
                    debug!(
                        event_name = "query.connection_close_failed",
                        error = %close_error,
                        "closing interrupted connection failed"
                    );
                }
                Err(ExecutionError::Timeout { seconds: timeout.as_secs() })
            }
            Err(error) => Err(database_error(error)),
        }
    }
}

async fn fetch(conn: &mut SqliteConnection, sql: &str) -> Result<QueryResult, sqlx::Error> {
    let statement = (&mut *conn).prepare(sql).await?;
    let columns =
        statement.columns().iter().map(|column| column.name().to_string()).collect::<Vec<_>>();

    let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;
    let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;

    Ok(QueryResult::new(columns, rows))
}

fn database_error(error: sqlx::Error) -> ExecutionError {
    ExecutionError::Database(error.to_string())
}

#[async_trait]
impl ReadOnlySource for SqliteReadOnlySource {
    async fn execute(
        &self,
        query: &SanitizedQuery,
        timeout: Duration,
    ) -> Result<QueryResult, ExecutionError> {
        // The progress handler is the real limit. This only covers time spent
        // outside the VM, such as waiting for a pooled connection.
        match tokio::time::timeout(timeout + BACKSTOP_GRACE, self.run(query.as_str(), timeout)).await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout { seconds: timeout.as_secs() }),
        }
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<Value>, sqlx::Error> {
    (0..row.len()).map(|index| decode_value(row, index)).collect()
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage_class = raw.type_info().name().to_ascii_uppercase();

    let value = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => Value::String(hex(&row.try_get_unchecked::<Vec<u8>, _>(index)?)),
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };

    Ok(value)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Guard plus read-only source plus the row and time budgets from
/// [`QueryConfig`].
#[derive(Clone)]
pub struct QueryExecutor {
    guard: SqlGuard,
    source: Arc<dyn ReadOnlySource>,
    max_rows: usize,
    statement_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(source: Arc<dyn ReadOnlySource>, config: &QueryConfig) -> Self {
        Self {
            guard: SqlGuard::new(config.max_rows_returned),
            source,
            max_rows: config.max_rows_returned,
            statement_timeout: config.statement_timeout(),
        }
    }

    pub fn guard(&self) -> &SqlGuard {
        &self.guard
    }

    pub async fn execute(&self, query: &SanitizedQuery) -> Result<QueryResult, ExecutionError> {
        let mut result = self.source.execute(query, self.statement_timeout).await?;

        let dropped = result.truncate(self.max_rows);
        if dropped > 0 {
            warn!(
                event_name = "query.rows_truncated",
                max_rows = self.max_rows,
                dropped_rows = dropped,
                "query returned more rows than allowed; result truncated"
            );
        }

        debug!(event_name = "query.executed", row_count = result.row_count, "query executed");
        Ok(result)
    }

    /// Guard then execute. This is the whole `run_sql` path.
    pub async fn run_sql_text(&self, raw: &str) -> Result<(SanitizedQuery, QueryResult), QueryError> {
        let sanitized = self.guard.validate(raw)?;
        let result = self.execute(&sanitized).await?;
        Ok((sanitized, result))
    }
}
