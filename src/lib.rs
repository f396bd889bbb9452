//! sqldao - declarative DAO runtime.
//!
//! Binds logical data-access operations to parameterized SQL templates, expands a
//! variable-length `IN (?..?)` member list, binds positional parameters, maps rows
//! into typed values and retries transient backend failures. A [`Transaction`] shares
//! one session across several DAO handles.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::Config;
pub use db::{Dao, OperationRegistry, RetryPolicy, SqliteSessionProvider, Transaction};
pub use error::{BackendError, DaoError, DaoResult};
pub use models::{
    ColumnSpec, FieldTable, JsonRecord, MembershipValues, Operation, OperationDescriptor,
    QueryParam, QuerySpec, ResultSpec, ResultType, SqlType, Value,
};
