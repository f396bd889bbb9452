//! Explicit transaction scope sharing one session across DAO handles.
//!
//! A transaction moves `NotStarted -> Active -> Ended` exactly once. While active it
//! owns a manual-commit session; participating handles borrow it and never close it.

use crate::db::session::{CommitMode, SessionProvider, SharedSession};
use crate::error::{DaoError, DaoResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const MSG_ALREADY_STARTED: &str = "Transaction already started";
pub const MSG_NOT_STARTED: &str = "Transaction not started";
pub const MSG_ALREADY_ENDED: &str = "Transaction already ended";

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NotStarted,
    Active,
    Ended,
}

/// Something that can run its statements on a transaction's session.
pub trait Participant {
    fn attach_session(&mut self, session: SharedSession);
}

/// Transaction context.
pub struct Transaction {
    id: String,
    started_at: Option<DateTime<Utc>>,
    provider: Arc<dyn SessionProvider>,
    state: TransactionState,
    session: Option<SharedSession>,
}

impl Transaction {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            id: format!("tx_{}", uuid::Uuid::new_v4()),
            started_at: None,
            provider,
            state: TransactionState::NotStarted,
            session: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Acquire a session and switch it to manual-commit mode.
    pub fn begin(&mut self) -> DaoResult<()> {
        match self.state {
            TransactionState::Active => return Err(DaoError::fatal(MSG_ALREADY_STARTED)),
            TransactionState::Ended => return Err(DaoError::fatal(MSG_ALREADY_ENDED)),
            TransactionState::NotStarted => {}
        }

        let mut session = self.provider.acquire()?;
        if let Err(e) = session.set_commit_mode(CommitMode::ManualCommit) {
            if let Err(close_err) = session.close() {
                error!(tx = %self.id, error = %close_err, "Failed to release session");
            }
            return Err(DaoError::fatal_backend("Unable to start the transaction", e));
        }

        self.session = Some(Arc::new(Mutex::new(session)));
        self.started_at = Some(Utc::now());
        self.state = TransactionState::Active;
        info!(tx = %self.id, "Transaction started");
        Ok(())
    }

    /// Route a handle's statements through this transaction's session.
    pub fn participate<H: Participant + ?Sized>(&self, handle: &mut H) -> DaoResult<()> {
        let session = self.active_session()?;
        handle.attach_session(Arc::clone(session));
        Ok(())
    }

    /// Commit pending work; the transaction stays active.
    pub fn commit(&self) -> DaoResult<()> {
        let session = self.active_session()?;
        session
            .lock()
            .commit()
            .map_err(|e| DaoError::fatal_backend("Unable to commit the transaction", e))?;
        info!(tx = %self.id, "Transaction committed");
        Ok(())
    }

    /// Discard pending work; the transaction stays active.
    pub fn rollback(&self) -> DaoResult<()> {
        let session = self.active_session()?;
        session
            .lock()
            .rollback()
            .map_err(|e| DaoError::fatal_backend("Unable to rollback the transaction", e))?;
        info!(tx = %self.id, "Transaction rolled back");
        Ok(())
    }

    /// Restore auto-commit, release the session and finish the transaction.
    ///
    /// The session is released even when restoring auto-commit fails; the first
    /// failure is reported.
    pub fn end(&mut self) -> DaoResult<()> {
        self.active_session()?;
        self.state = TransactionState::Ended;
        let Some(shared) = self.session.take() else {
            return Ok(());
        };

        let mut session = shared.lock();
        let restored = session
            .set_commit_mode(CommitMode::AutoCommit)
            .map_err(|e| DaoError::fatal_backend("Unable to end the transaction", e));
        let closed = session
            .close()
            .map_err(|e| DaoError::fatal_backend("Unable to release the transaction session", e));

        let elapsed_ms = self
            .started_at
            .map(|t| (Utc::now() - t).num_milliseconds())
            .unwrap_or_default();
        info!(tx = %self.id, elapsed_ms, "Transaction ended");
        restored.and(closed)
    }

    fn active_session(&self) -> DaoResult<&SharedSession> {
        match (self.state, &self.session) {
            (TransactionState::Active, Some(session)) => Ok(session),
            (TransactionState::Ended, _) => Err(DaoError::fatal(MSG_ALREADY_ENDED)),
            _ => Err(DaoError::fatal(MSG_NOT_STARTED)),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        let Some(shared) = self.session.take() else {
            return;
        };
        warn!(tx = %self.id, "Transaction dropped while active, rolling back");
        let mut session = shared.lock();
        if let Err(e) = session.rollback() {
            error!(tx = %self.id, error = %e, "Rollback on drop failed");
        }
        if let Err(e) = session.set_commit_mode(CommitMode::AutoCommit) {
            error!(tx = %self.id, error = %e, "Failed to restore auto-commit on drop");
        }
        if let Err(e) = session.close() {
            error!(tx = %self.id, error = %e, "Failed to release session on drop");
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("started_at", &self.started_at)
            .finish()
    }
}
