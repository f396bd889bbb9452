//! Data models for the DAO runtime.
//!
//! This module re-exports the declarative metadata, value and result-target types
//! used throughout the engine.

pub mod operation;
pub mod record;
pub mod value;

// Re-export commonly used types
pub use operation::{
    ColumnSpec, MEMBERSHIP_MARKER, Operation, OperationDescriptor, OperationKind, ParamSpec,
    QuerySpec, ResultSpec,
};
pub use record::{FieldTable, FromValue, JsonRecord, ResultType};
pub use value::{MembershipValues, QueryParam, SqlType, Value};
