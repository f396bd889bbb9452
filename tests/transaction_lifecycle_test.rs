//! Transaction state machine and session sharing.

mod common;

use common::*;
use sqldao::db::{CommitMode, Dao, Transaction, TransactionState};
use sqldao::{BackendError, DaoError, params};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<MockProvider>, Transaction, Dao<PersonInfoDao>) {
    let provider = Arc::new(
        MockProvider::new()
            .with_rows(&PERSON_COLUMNS, vec![sanjaya_row()])
            .with_affected(1),
    );
    let tx = Transaction::new(provider.clone());
    let dao = Dao::new(provider.clone(), person_registry()).with_retry_delay(Duration::ZERO);
    (provider, tx, dao)
}

fn is_fatal(result: Result<(), DaoError>, message: &str) -> bool {
    matches!(result, Err(DaoError::FatalQuery { message: m, .. }) if m == message)
}

#[test]
fn test_operations_before_begin_fail() {
    let (provider, mut tx, mut dao) = setup();
    assert!(is_fatal(tx.commit(), "Transaction not started"));
    assert!(is_fatal(tx.rollback(), "Transaction not started"));
    assert!(is_fatal(tx.participate(&mut dao), "Transaction not started"));
    assert!(is_fatal(tx.end(), "Transaction not started"));
    assert_eq!(tx.state(), TransactionState::NotStarted);
    assert_eq!(provider.stats.acquires(), 0);
}

#[test]
fn test_double_begin_fails() {
    let (_provider, mut tx, _dao) = setup();
    tx.begin().unwrap();
    assert!(is_fatal(tx.begin(), "Transaction already started"));
    assert!(tx.is_active());
    tx.end().unwrap();
}

#[test]
fn test_ended_is_terminal() {
    let (_provider, mut tx, _dao) = setup();
    tx.begin().unwrap();
    tx.end().unwrap();
    assert_eq!(tx.state(), TransactionState::Ended);
    assert!(tx.begin().is_err());
    assert!(tx.commit().is_err());
    assert!(tx.end().is_err());
}

#[test]
fn test_lifecycle_switches_commit_mode() {
    let (provider, mut tx, _dao) = setup();
    tx.begin().unwrap();
    assert!(tx.id().starts_with("tx_"));
    assert!(tx.started_at().is_some());
    tx.commit().unwrap();
    tx.rollback().unwrap();
    tx.commit().unwrap();
    tx.end().unwrap();

    assert_eq!(provider.stats.commits(), 2);
    assert_eq!(provider.stats.rollbacks(), 1);
    assert_eq!(
        *provider.stats.modes.lock(),
        vec![CommitMode::ManualCommit, CommitMode::AutoCommit]
    );
    assert_eq!(provider.stats.acquires(), 1);
    assert_eq!(provider.stats.closes(), 1);
}

#[test]
fn test_participant_shares_session_until_end() {
    let (provider, mut tx, mut dao) = setup();
    tx.begin().unwrap();
    tx.participate(&mut dao).unwrap();
    assert!(dao.is_participating());

    let _: Vec<PersonInfo> = dao.find_all(GET_ALL, &[]).unwrap();
    dao.update(UPDATE_CITY, &params!["Kandy", 101]).unwrap();
    dao.delete(DELETE_BY_ID, &params![102]).unwrap();

    assert_eq!(provider.stats.statements(), 3);
    assert_eq!(provider.stats.acquires(), 1);
    assert_eq!(provider.stats.closes(), 0);

    tx.end().unwrap();
    assert_eq!(provider.stats.closes(), 1);
    assert!(!dao.is_participating());

    // With the transaction over the handle acquires its own sessions again.
    dao.update(UPDATE_CITY, &params!["Galle", 101]).unwrap();
    assert_eq!(provider.stats.acquires(), 2);
    assert_eq!(provider.stats.closes(), 2);
}

#[test]
fn test_participant_retry_reuses_shared_session() {
    let provider = Arc::new(
        MockProvider::new()
            .with_affected(1)
            .fail_next(BackendError::transient("database is locked")),
    );
    let mut tx = Transaction::new(provider.clone());
    let mut dao: Dao<PersonInfoDao> =
        Dao::new(provider.clone(), person_registry()).with_retry_delay(Duration::ZERO);
    tx.begin().unwrap();
    tx.participate(&mut dao).unwrap();

    assert_eq!(dao.update(UPDATE_CITY, &params!["Kandy", 101]).unwrap(), 1);
    assert_eq!(provider.stats.statements(), 2);
    assert_eq!(provider.stats.acquires(), 1);
    assert_eq!(provider.stats.closes(), 0);
    tx.end().unwrap();
}

#[test]
fn test_drop_while_active_rolls_back_and_releases() {
    let (provider, mut tx, _dao) = setup();
    tx.begin().unwrap();
    drop(tx);
    assert_eq!(provider.stats.rollbacks(), 1);
    assert_eq!(provider.stats.closes(), 1);
    assert_eq!(
        provider.stats.modes.lock().last().copied(),
        Some(CommitMode::AutoCommit)
    );
}
