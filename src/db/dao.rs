//! Operation handle.
//!
//! `Dao<D>` dispatches the operations registered for DAO type `D`. A call resolves
//! its metadata, validates and binds parameters, then runs the statement inside the
//! retry executor on either the participating transaction's session or a session
//! it acquires and releases itself.

use crate::db::binder::{self, PreparedStatement};
use crate::db::mapper;
use crate::db::registry::OperationRegistry;
use crate::db::retry::RetryPolicy;
use crate::db::session::{Session, SessionProvider, SharedSession};
use crate::db::statement;
use crate::db::transaction::Participant;
use crate::error::{DaoError, DaoResult};
use crate::models::{Operation, OperationKind, QueryParam, ResultSpec, ResultType, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub struct Dao<D> {
    provider: Arc<dyn SessionProvider>,
    registry: Arc<OperationRegistry>,
    retry: RetryPolicy,
    session: Option<SharedSession>,
    _dao: PhantomData<fn() -> D>,
}

impl<D: 'static> Dao<D> {
    pub fn new(provider: Arc<dyn SessionProvider>, registry: Arc<OperationRegistry>) -> Self {
        Self {
            provider,
            registry,
            retry: RetryPolicy::default(),
            session: None,
            _dao: PhantomData,
        }
    }

    pub fn with_retry_count(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.delay = delay;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Whether calls currently run on a transaction's open session.
    pub fn is_participating(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.lock().is_closed())
    }

    /// Read the first matching row, or `None`.
    pub fn find<T: ResultType>(&self, index: usize, params: &[QueryParam]) -> DaoResult<Option<T>> {
        let (op, sql, values) = self.prepare(index, params)?;
        let result = result_spec(&op)?;
        self.run(OperationKind::Read, &op, |session| {
            let rows = session.query(&sql, &values)?;
            mapper::map_one::<T>(rows, result)
        })
    }

    /// Read every matching row in order.
    pub fn find_all<T: ResultType>(&self, index: usize, params: &[QueryParam]) -> DaoResult<Vec<T>> {
        let (op, sql, values) = self.prepare(index, params)?;
        let result = result_spec(&op)?;
        self.run(OperationKind::ReadAll, &op, |session| {
            let rows = session.query(&sql, &values)?;
            mapper::map_all::<T>(rows, result)
        })
    }

    /// Insert; returns the affected row count.
    pub fn create(&self, index: usize, params: &[QueryParam]) -> DaoResult<u64> {
        self.write(OperationKind::Create, index, params)
    }

    /// Update; returns the affected row count.
    pub fn update(&self, index: usize, params: &[QueryParam]) -> DaoResult<u64> {
        self.write(OperationKind::Update, index, params)
    }

    /// Delete; returns the affected row count.
    pub fn delete(&self, index: usize, params: &[QueryParam]) -> DaoResult<u64> {
        self.write(OperationKind::Delete, index, params)
    }

    fn write(&self, kind: OperationKind, index: usize, params: &[QueryParam]) -> DaoResult<u64> {
        let (op, sql, values) = self.prepare(index, params)?;
        self.run(kind, &op, |session| Ok(session.execute(&sql, &values)?))
    }

    /// Resolve, validate, build and bind. Nothing here touches a session.
    fn prepare(
        &self,
        index: usize,
        params: &[QueryParam],
    ) -> DaoResult<(Arc<Operation>, String, Vec<Value>)> {
        let op = self.registry.resolve::<D>(index)?;
        let query = &op.query;
        binder::validate(params, &query.param_specs, query.has_membership_clause)?;

        let mut stmt = PreparedStatement::new(statement::build(query, params)?);
        binder::bind(&mut stmt, params, &query.param_specs)?;
        let (sql, values) = stmt.into_parts()?;
        Ok((op, sql, values))
    }

    fn run<R, F>(&self, kind: OperationKind, op: &Operation, mut work: F) -> DaoResult<R>
    where
        F: FnMut(&mut dyn Session) -> DaoResult<R>,
    {
        debug!(
            dao = std::any::type_name::<D>(),
            operation = %op.descriptor.name,
            kind = %kind,
            "Dispatching operation"
        );
        self.retry
            .run(kind.as_str(), || self.with_session(&mut work))
    }

    /// Run `work` on the participating session if it is still open, otherwise on a
    /// freshly acquired session that is released afterwards.
    fn with_session<R>(
        &self,
        work: &mut dyn FnMut(&mut dyn Session) -> DaoResult<R>,
    ) -> DaoResult<R> {
        if let Some(shared) = &self.session {
            let mut guard = shared.lock();
            if !guard.is_closed() {
                return work(&mut **guard);
            }
        }

        let mut session = self.provider.acquire()?;
        let result = work(session.as_mut());
        if let Err(e) = session.close() {
            error!(dao = std::any::type_name::<D>(), error = %e, "Failed to release session");
        }
        result
    }
}

impl<D> Participant for Dao<D> {
    fn attach_session(&mut self, session: SharedSession) {
        self.session = Some(session);
    }
}

impl<D> std::fmt::Debug for Dao<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dao")
            .field("dao", &std::any::type_name::<D>())
            .field("retry", &self.retry)
            .field("participating", &self.session.is_some())
            .finish()
    }
}

fn result_spec(op: &Operation) -> DaoResult<&ResultSpec> {
    op.result.as_ref().ok_or_else(|| {
        DaoError::configuration(format!(
            "operation {} ('{}') declares no result spec",
            op.descriptor.index, op.descriptor.name
        ))
    })
}
