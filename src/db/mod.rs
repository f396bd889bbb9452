//! The dispatch and execution engine.
//!
//! - Operation registry and the `Dao` handle that dispatches through it
//! - Statement building with membership-clause expansion
//! - Positional parameter binding and row mapping
//! - Retry executor and transaction context
//! - Session interface and the SQLite session provider

pub mod binder;
pub mod dao;
#[macro_use]
pub mod macros;
pub mod mapper;
pub mod registry;
pub mod retry;
pub mod session;
pub mod sqlite;
pub mod statement;
pub mod transaction;

pub use binder::PreparedStatement;
pub use dao::Dao;
pub use registry::OperationRegistry;
pub use retry::RetryPolicy;
pub use session::{CommitMode, Row, Rows, Session, SessionProvider, SharedSession};
pub use sqlite::{SqliteSession, SqliteSessionProvider};
pub use transaction::{Participant, Transaction, TransactionState};
