//! Error types for the DAO runtime.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Configuration and parameter errors point at a programmer defect and are never retried;
//! backend failures are classified as transient or fatal and handled by the retry executor.

use thiserror::Error;

/// Classification of a raw backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Likely to succeed if retried unchanged (connection blip, lock contention).
    Transient,
    /// Will fail again if retried unchanged.
    Fatal,
}

/// A failure reported by a session or the driver underneath it.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    /// e.g., "40001" for a serialization failure, "5" for SQLITE_BUSY
    pub sql_state: Option<String>,
}

impl BackendError {
    /// Create a transient backend error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Transient,
            message: message.into(),
            sql_state: None,
        }
    }

    /// Create a fatal backend error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Fatal,
            message: message.into(),
            sql_state: None,
        }
    }

    /// Attach the backend's SQL state / error code.
    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == BackendErrorKind::Transient
    }
}

#[derive(Error, Debug)]
pub enum DaoError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid parameter {position}: {message}")]
    InvalidParameter { position: usize, message: String },

    #[error("Error in {operation} after retry ({attempts} attempts): {source}")]
    TransientRetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("{message}")]
    FatalQuery {
        message: String,
        #[source]
        source: Option<BackendError>,
    },

    #[error("Unable to map result into {type_name}: {message}")]
    ResultMapping { type_name: String, message: String },

    /// Raw session failure that has not been classified by the retry executor yet.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl DaoError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error for a 1-based declared position.
    pub fn invalid_parameter(position: usize, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            position,
            message: message.into(),
        }
    }

    /// Create a fatal query error without an underlying backend cause.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::FatalQuery {
            message: message.into(),
            source: None,
        }
    }

    /// Create a fatal query error caused by a backend failure.
    pub fn fatal_backend(message: impl Into<String>, source: BackendError) -> Self {
        Self::FatalQuery {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a result mapping error.
    pub fn result_mapping(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResultMapping {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Check if this error should be retried by the retry executor.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_transient())
    }

    /// Backend SQL state carried by this error, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Backend(e) | Self::TransientRetryExhausted { source: e, .. } => {
                e.sql_state.as_deref()
            }
            Self::FatalQuery {
                source: Some(e), ..
            } => e.sql_state.as_deref(),
            _ => None,
        }
    }
}

/// SQLite primary result codes worth retrying: BUSY and LOCKED.
const SQLITE_TRANSIENT_CODES: &[i64] = &[5, 6];

/// MySQL lock wait timeout and deadlock.
const MYSQL_TRANSIENT_CODES: &[&str] = &["1205", "1213"];

/// Decide whether a backend error code denotes a transient condition.
pub fn is_transient_code(code: &str) -> bool {
    if let Ok(n) = code.parse::<i64>() {
        // SQLite extended codes carry the primary code in the low byte; MySQL codes start at 1000.
        if n < 1000 && SQLITE_TRANSIENT_CODES.contains(&(n & 0xff)) {
            return true;
        }
    }
    code.starts_with("08")
        || code == "40001"
        || code == "40P01"
        || MYSQL_TRANSIENT_CODES.contains(&code)
}

/// Convert sqlx errors to BackendError.
impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                let transient = code.as_deref().is_some_and(is_transient_code);
                let base = if transient {
                    BackendError::transient(db_err.message())
                } else {
                    BackendError::fatal(db_err.message())
                };
                match code {
                    Some(code) => base.with_sql_state(code),
                    None => base,
                }
            }
            sqlx::Error::PoolTimedOut => {
                BackendError::transient("Timed out acquiring a connection from the pool")
            }
            sqlx::Error::Io(io_err) => BackendError::transient(format!("I/O error: {}", io_err)),
            sqlx::Error::Protocol(msg) => BackendError::fatal(format!("Protocol error: {}", msg)),
            sqlx::Error::PoolClosed => BackendError::fatal("Connection pool is closed"),
            sqlx::Error::Configuration(msg) => {
                BackendError::fatal(format!("Driver configuration error: {}", msg))
            }
            sqlx::Error::ColumnNotFound(col) => {
                BackendError::fatal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                BackendError::fatal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::WorkerCrashed => BackendError::transient("Database worker crashed"),
            _ => BackendError::fatal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for DAO operations.
pub type DaoResult<T> = Result<T, DaoError>;
