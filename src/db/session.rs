//! Session and session-provider interface.
//!
//! The engine never talks to a pool directly. It asks a [`SessionProvider`] for a
//! session, runs statements on it, and closes it when it owns it. Rows come back
//! fully materialized as [`Rows`], a forward-only cursor over decoded values.

use crate::error::{BackendError, DaoResult};
use crate::models::Value;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Commit behaviour of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Every statement commits on its own.
    #[default]
    AutoCommit,
    /// Work accumulates until `commit()` or `rollback()`.
    ManualCommit,
}

/// One logical connection obtained from a [`SessionProvider`].
pub trait Session: Send {
    /// Run a statement that produces rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Rows, BackendError>;

    /// Run a statement that modifies data and return the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, BackendError>;

    fn commit_mode(&self) -> CommitMode;

    /// Switch commit mode. Leaving manual-commit mode commits pending work.
    fn set_commit_mode(&mut self, mode: CommitMode) -> Result<(), BackendError>;

    fn commit(&mut self) -> Result<(), BackendError>;

    fn rollback(&mut self) -> Result<(), BackendError>;

    /// Return the underlying connection to its pool. Idempotent.
    fn close(&mut self) -> Result<(), BackendError>;

    fn is_closed(&self) -> bool;
}

/// Source of sessions; constructed and torn down by the host application.
pub trait SessionProvider: Send + Sync {
    /// Acquire a session in auto-commit mode.
    ///
    /// Fails with a configuration error when the provider is not initialized, or with a
    /// backend error when the pool cannot hand out a connection.
    fn acquire(&self) -> DaoResult<Box<dyn Session>>;
}

/// A session shared between a transaction and the handles participating in it.
pub type SharedSession = Arc<Mutex<Box<dyn Session>>>;

/// A decoded result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Position of a column by name; exact match first, then case-insensitive.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index_of(name).and_then(|idx| self.values.get(idx))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Remove a column value from the row, leaving NULL behind.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        let idx = self.index_of(name)?;
        self.values.get_mut(idx).map(std::mem::take)
    }
}

/// Forward-only cursor over the rows of one result set.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    columns: Arc<[String]>,
    rows: VecDeque<Vec<Value>>,
}

impl Rows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows
            .pop_front()
            .map(|values| Row::new(Arc::clone(&self.columns), values))
    }
}
