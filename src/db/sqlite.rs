//! SQLite session provider backed by an `sqlx` pool.
//!
//! The engine is synchronous, so the provider owns a private tokio runtime and drives
//! every driver future with `block_on`. Calling into it from inside another tokio
//! runtime's async context is not supported.

use crate::config::PoolOptions;
use crate::db::session::{CommitMode, Rows, Session, SessionProvider};
use crate::error::{BackendError, DaoError, DaoResult};
use crate::models::Value;
use parking_lot::RwLock;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, trace, warn};

/// Logical category of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Boolean,
    Text,
    Binary,
    Unknown,
}

/// Classify a declared SQLite column type.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("int") {
        return TypeCategory::Integer;
    }
    if lower.contains("real")
        || lower.contains("floa")
        || lower.contains("doub")
        || lower.contains("numeric")
        || lower.contains("decimal")
    {
        return TypeCategory::Float;
    }
    if lower.contains("char") || lower.contains("clob") || lower.contains("text") {
        return TypeCategory::Text;
    }
    if lower.contains("blob") || lower.contains("binary") {
        return TypeCategory::Binary;
    }
    TypeCategory::Unknown
}

/// Session provider over an SQLite database file or in-memory database.
pub struct SqliteSessionProvider {
    runtime: Arc<Runtime>,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteSessionProvider {
    /// Open a pool for `url` (e.g. `sqlite:path/to/db.sqlite`), creating the file if missing.
    pub fn connect(url: &str, pool_opts: &PoolOptions) -> DaoResult<Self> {
        pool_opts.validate().map_err(DaoError::configuration)?;

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                DaoError::configuration(format!(
                    "Invalid SQLite connection string: {}. Expected sqlite:path/to/db.sqlite",
                    e
                ))
            })?
            .create_if_missing(true);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("sqldao-sqlite")
            .enable_all()
            .build()
            .map_err(|e| DaoError::configuration(format!("Failed to start runtime: {}", e)))?;

        let max_connections = pool_opts.max_connections_or_default(is_in_memory(url));
        let min_connections = pool_opts.min_connections_or_default().min(max_connections);

        let pool = runtime
            .block_on(
                SqlitePoolOptions::new()
                    .min_connections(min_connections)
                    .max_connections(max_connections)
                    .acquire_timeout(Duration::from_secs(pool_opts.acquire_timeout_or_default()))
                    .idle_timeout(Duration::from_secs(pool_opts.idle_timeout_or_default()))
                    .connect_with(options),
            )
            .map_err(|e| DaoError::Backend(BackendError::from(e)))?;

        info!(
            max_connections,
            "SQLite session provider ready"
        );
        Ok(Self {
            runtime: Arc::new(runtime),
            pool: RwLock::new(Some(pool)),
        })
    }

    /// Close the pool. Later `acquire` calls fail with a configuration error.
    pub fn close(&self) {
        if let Some(pool) = self.pool.write().take() {
            self.runtime.block_on(pool.close());
            info!("SQLite session provider closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.read().is_none()
    }
}

/// Whether `url` names an in-memory database rather than a file.
fn is_in_memory(url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    url.contains(":memory:") || url.contains("mode=memory")
}

impl SessionProvider for SqliteSessionProvider {
    fn acquire(&self) -> DaoResult<Box<dyn Session>> {
        let pool = self
            .pool
            .read()
            .clone()
            .ok_or_else(|| DaoError::configuration("Session provider is not initialized"))?;
        let conn = self
            .runtime
            .block_on(pool.acquire())
            .map_err(|e| DaoError::Backend(BackendError::from(e)))?;
        trace!(idle = pool.num_idle(), size = pool.size(), "Acquired SQLite connection");
        Ok(Box::new(SqliteSession {
            runtime: Arc::clone(&self.runtime),
            conn: Some(conn),
            mode: CommitMode::AutoCommit,
        }))
    }
}

impl Drop for SqliteSessionProvider {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SqliteSessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionProvider")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// One pooled SQLite connection.
///
/// Manual-commit mode keeps an explicit transaction open at all times: `commit` and
/// `rollback` finish the current one and immediately begin the next.
pub struct SqliteSession {
    runtime: Arc<Runtime>,
    conn: Option<PoolConnection<Sqlite>>,
    mode: CommitMode,
}

impl SqliteSession {
    fn conn(&mut self) -> Result<&mut PoolConnection<Sqlite>, BackendError> {
        self.conn
            .as_mut()
            .ok_or_else(|| BackendError::fatal("Session is closed"))
    }

    fn raw(&mut self, sql: &'static str) -> Result<(), BackendError> {
        let runtime = Arc::clone(&self.runtime);
        let conn = self.conn()?;
        debug!(sql, "Executing transaction control statement");
        runtime.block_on(sqlx::query(sql).execute(&mut **conn))?;
        Ok(())
    }
}

impl Session for SqliteSession {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Rows, BackendError> {
        let runtime = Arc::clone(&self.runtime);
        let conn = self.conn()?;
        let rows = runtime.block_on(async {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_value(query, param);
            }
            query.fetch_all(&mut **conn).await
        })?;
        decode_rows(&rows)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, BackendError> {
        let runtime = Arc::clone(&self.runtime);
        let conn = self.conn()?;
        let result = runtime.block_on(async {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_value(query, param);
            }
            query.execute(&mut **conn).await
        })?;
        Ok(result.rows_affected())
    }

    fn commit_mode(&self) -> CommitMode {
        self.mode
    }

    fn set_commit_mode(&mut self, mode: CommitMode) -> Result<(), BackendError> {
        match (self.mode, mode) {
            (CommitMode::AutoCommit, CommitMode::ManualCommit) => self.raw("BEGIN")?,
            (CommitMode::ManualCommit, CommitMode::AutoCommit) => self.raw("COMMIT")?,
            _ => return Ok(()),
        }
        self.mode = mode;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BackendError> {
        if self.mode == CommitMode::AutoCommit {
            return Err(BackendError::fatal("commit requires manual-commit mode"));
        }
        self.raw("COMMIT")?;
        self.raw("BEGIN")
    }

    fn rollback(&mut self) -> Result<(), BackendError> {
        if self.mode == CommitMode::AutoCommit {
            return Err(BackendError::fatal("rollback requires manual-commit mode"));
        }
        self.raw("ROLLBACK")?;
        self.raw("BEGIN")
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if self.conn.is_none() {
            return Ok(());
        }
        let mut outcome = Ok(());
        if self.mode == CommitMode::ManualCommit {
            outcome = self.raw("ROLLBACK");
            if let Err(e) = &outcome {
                warn!(error = %e, "Rollback before release failed");
            }
            self.mode = CommitMode::AutoCommit;
        }
        // Returning a connection to the pool spawns onto the runtime.
        let _guard = self.runtime.enter();
        drop(self.conn.take());
        outcome
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to release SQLite session on drop");
        }
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
    }
}

fn decode_rows(rows: &[SqliteRow]) -> Result<Rows, BackendError> {
    let Some(first) = rows.first() else {
        return Ok(Rows::empty());
    };
    let columns: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();
    let categories: Vec<TypeCategory> = first
        .columns()
        .iter()
        .map(|c| categorize_type(c.type_info().name()))
        .collect();

    let mut decoded = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, category) in categories.iter().enumerate() {
            values.push(decode_column(row, idx, *category)?);
        }
        decoded.push(values);
    }
    Ok(Rows::new(columns, decoded))
}

/// Decode by the value's storage class; a declared boolean column reads as `Bool`.
fn decode_column(row: &SqliteRow, idx: usize, declared: TypeCategory) -> Result<Value, BackendError> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => {
            let i: i64 = row.try_get_unchecked(idx)?;
            if declared == TypeCategory::Boolean {
                Value::Bool(i != 0)
            } else {
                Value::Int(i)
            }
        }
        "REAL" | "NUMERIC" => Value::Float(row.try_get_unchecked(idx)?),
        "BLOB" => Value::Bytes(row.try_get_unchecked(idx)?),
        _ => Value::Text(row.try_get_unchecked(idx)?),
    };
    Ok(value)
}
