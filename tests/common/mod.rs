//! Shared fixtures: a scripted in-memory session provider and the person_info DAO.

#![allow(dead_code)]

use parking_lot::Mutex;
use sqldao::db::{CommitMode, Rows, Session, SessionProvider};
use sqldao::models::{
    ColumnSpec, Operation, OperationDescriptor, QuerySpec, ResultSpec, SqlType, Value,
};
use sqldao::{BackendError, DaoError, DaoResult, OperationRegistry, record_type};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters observed by the mock sessions.
#[derive(Debug, Default)]
pub struct MockStats {
    pub acquires: AtomicUsize,
    pub closes: AtomicUsize,
    pub statements: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub log: Mutex<Vec<(String, Vec<Value>)>>,
    pub modes: Mutex<Vec<CommitMode>>,
}

impl MockStats {
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> usize {
        self.statements.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn last_statement(&self) -> Option<(String, Vec<Value>)> {
        self.log.lock().last().cloned()
    }
}

#[derive(Debug, Default)]
struct Script {
    failures: VecDeque<BackendError>,
    always: Option<BackendError>,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    affected: u64,
}

/// Session provider whose sessions replay a scripted response.
#[derive(Debug, Default)]
pub struct MockProvider {
    pub stats: Arc<MockStats>,
    script: Arc<Mutex<Script>>,
    uninitialized: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose `acquire` always fails as not initialized.
    pub fn uninitialized() -> Self {
        Self {
            uninitialized: true,
            ..Self::default()
        }
    }

    pub fn with_rows(self, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        {
            let mut script = self.script.lock();
            script.columns = columns.iter().map(|c| c.to_string()).collect();
            script.rows = rows;
        }
        self
    }

    pub fn with_affected(self, affected: u64) -> Self {
        self.script.lock().affected = affected;
        self
    }

    /// Fail the next statement with `error`; queued failures are consumed in order.
    pub fn fail_next(self, error: BackendError) -> Self {
        self.script.lock().failures.push_back(error);
        self
    }

    /// Fail every statement with `error`.
    pub fn fail_always(self, error: BackendError) -> Self {
        self.script.lock().always = Some(error);
        self
    }
}

impl SessionProvider for MockProvider {
    fn acquire(&self) -> DaoResult<Box<dyn Session>> {
        if self.uninitialized {
            return Err(DaoError::configuration("Session provider is not initialized"));
        }
        self.stats.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            stats: Arc::clone(&self.stats),
            script: Arc::clone(&self.script),
            mode: CommitMode::AutoCommit,
            closed: false,
        }))
    }
}

struct MockSession {
    stats: Arc<MockStats>,
    script: Arc<Mutex<Script>>,
    mode: CommitMode,
    closed: bool,
}

impl MockSession {
    fn run(&mut self, sql: &str, params: &[Value]) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::fatal("Session is closed"));
        }
        self.stats.statements.fetch_add(1, Ordering::SeqCst);
        self.stats
            .log
            .lock()
            .push((sql.to_string(), params.to_vec()));
        let mut script = self.script.lock();
        if let Some(e) = script.failures.pop_front() {
            return Err(e);
        }
        match &script.always {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl Session for MockSession {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Rows, BackendError> {
        self.run(sql, params)?;
        let script = self.script.lock();
        Ok(Rows::new(script.columns.clone(), script.rows.clone()))
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, BackendError> {
        self.run(sql, params)?;
        Ok(self.script.lock().affected)
    }

    fn commit_mode(&self) -> CommitMode {
        self.mode
    }

    fn set_commit_mode(&mut self, mode: CommitMode) -> Result<(), BackendError> {
        self.stats.modes.lock().push(mode);
        self.mode = mode;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BackendError> {
        self.stats.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BackendError> {
        self.stats.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if !self.closed {
            self.closed = true;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Registry key for the person_info operations.
pub struct PersonInfoDao;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PersonInfo {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub email: Option<String>,
    pub city: String,
}

record_type!(PersonInfo { id, name, age, email, city });

pub const GET_ALL: usize = 0;
pub const GET_BY_ID: usize = 1;
pub const GET_IDS: usize = 2;
pub const GET_BY_IDS_IN_CITY: usize = 3;
pub const INSERT: usize = 4;
pub const UPDATE_CITY: usize = 5;
pub const DELETE_BY_ID: usize = 6;

fn person_columns() -> Vec<ColumnSpec> {
    ["id", "name", "age", "email", "city"]
        .into_iter()
        .map(ColumnSpec::new)
        .collect()
}

pub fn person_operations() -> Vec<Operation> {
    let select = "SELECT id, name, age, email, city FROM person_info";
    vec![
        Operation::new(
            OperationDescriptor::new(GET_ALL, "get_person_info"),
            QuerySpec::new(format!("{select} ORDER BY id")),
        )
        .returning::<PersonInfo>(ResultSpec::record(person_columns()))
        .expect("valid person result"),
        Operation::new(
            OperationDescriptor::new(GET_BY_ID, "get_person_info_by_id")
                .with_params([SqlType::Integer]),
            QuerySpec::new(format!("{select} WHERE id = ?")).param(SqlType::Integer),
        )
        .returning::<PersonInfo>(ResultSpec::record(person_columns()))
        .expect("valid person result"),
        Operation::new(
            OperationDescriptor::new(GET_IDS, "get_person_ids"),
            QuerySpec::new("SELECT id FROM person_info ORDER BY id"),
        )
        .returning::<i64>(ResultSpec::scalar(ColumnSpec::new("id")))
        .expect("valid scalar result"),
        Operation::new(
            OperationDescriptor::new(GET_BY_IDS_IN_CITY, "get_person_info_by_ids"),
            QuerySpec::new(format!(
                "{select} WHERE id IN (?..?) AND city = ? ORDER BY id"
            ))
            .with_membership_clause()
            .param(SqlType::Integer)
            .param(SqlType::Varchar),
        )
        .returning::<PersonInfo>(ResultSpec::record(person_columns()))
        .expect("valid person result"),
        Operation::new(
            OperationDescriptor::new(INSERT, "insert_person_info"),
            QuerySpec::new(
                "INSERT INTO person_info (id, name, age, email, city) VALUES (?, ?, ?, ?, ?)",
            )
            .param(SqlType::Integer)
            .param(SqlType::Varchar)
            .param(SqlType::Integer)
            .nullable_param(SqlType::Varchar)
            .param(SqlType::Varchar),
        ),
        Operation::new(
            OperationDescriptor::new(UPDATE_CITY, "update_person_city"),
            QuerySpec::new("UPDATE person_info SET city = ? WHERE id = ?")
                .param(SqlType::Varchar)
                .param(SqlType::Integer),
        ),
        Operation::new(
            OperationDescriptor::new(DELETE_BY_ID, "delete_person_info"),
            QuerySpec::new("DELETE FROM person_info WHERE id = ?").param(SqlType::Integer),
        ),
    ]
}

pub fn person_registry() -> Arc<OperationRegistry> {
    let registry = OperationRegistry::new();
    registry
        .register::<PersonInfoDao>(person_operations())
        .expect("person operations register");
    Arc::new(registry)
}

pub fn sanjaya_row() -> Vec<Value> {
    vec![
        Value::Int(101),
        Value::Text("Sanjaya Karunasena".into()),
        Value::Int(25),
        Value::Text("sanjaya@example.com".into()),
        Value::Text("Colombo".into()),
    ]
}

pub const PERSON_COLUMNS: [&str; 5] = ["id", "name", "age", "email", "city"];
