//! Backlog contract exercised through the public store traits

use crate::common::*;
use change_notifier::models::{CompletionMask, HandlerId};
use change_notifier::store::{BacklogStore, Session, SessionError, StoreError};
use serde_json::json;

#[tokio::test]
async fn test_list_returns_records_with_persisted_flags() {
    let store = seeded_store(&[key(2), key(1)]);
    let mut session = store.session();
    let flag = CompletionMask::EMPTY.with(HandlerId::new(12).unwrap());

    session.begin().await.unwrap();
    store.update_processed(&mut session, key(2), flag).await.unwrap();
    session.commit().await.unwrap();

    let records = store.list(&mut session).await.unwrap();
    let listed: Vec<_> = records.iter().map(|r| (r.key, r.processed)).collect();
    assert_eq!(
        listed,
        vec![(key(1), CompletionMask::EMPTY), (key(2), flag)]
    );
    assert_eq!(records[1].payload, "event-2");
}

#[tokio::test]
async fn test_update_outside_transaction_is_rejected() {
    let store = seeded_store(&[key(1)]);
    let mut session = store.session();

    let err = store
        .update_processed(&mut session, key(1), CompletionMask::from_bits(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Session(SessionError::NoActiveTransaction { .. })
    ));
}

#[tokio::test]
async fn test_update_of_missing_record_fails() {
    let store = TestStore::new();
    let mut session = store.session();
    session.begin().await.unwrap();

    let err = store
        .update_processed(&mut session, key(9), CompletionMask::from_bits(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::RecordNotFound { key: k } if k == key(9)));
    session.rollback().await.unwrap();
}

#[tokio::test]
async fn test_nested_begin_rejected() {
    let store = TestStore::new();
    let mut session = store.session();
    session.begin().await.unwrap();

    assert!(matches!(
        session.begin().await,
        Err(SessionError::AlreadyInTransaction)
    ));
    assert!(session.in_transaction());
}

#[tokio::test]
async fn test_session_writes_share_transaction_with_flag_update() {
    let store = seeded_store(&[key(1)]);
    let mut session = store.session();

    session.begin().await.unwrap();
    session.put("audit/1", json!({"seen": true})).unwrap();
    store
        .update_processed(&mut session, key(1), CompletionMask::from_bits(0b100))
        .await
        .unwrap();
    assert!(store.value("audit/1").is_none());
    session.commit().await.unwrap();

    assert_eq!(store.value("audit/1"), Some(json!({"seen": true})));
    assert_eq!(store.processed(key(1)).unwrap().bits(), 0b100);
    assert_eq!(store.stats().commits, 1);
}

#[tokio::test]
async fn test_delete_and_commit_uses_own_transaction() {
    let store = seeded_store(&[key(1), key(2)]);
    let mut session = store.session();

    store.delete_and_commit(&mut session, key(1)).await.unwrap();
    assert!(!session.in_transaction());
    assert_eq!(store.keys(), vec![key(2)]);

    // already gone is not an error
    store.delete_and_commit(&mut session, key(1)).await.unwrap();
    assert_eq!(store.stats().deleted, 1);
}

#[tokio::test]
async fn test_sessions_from_same_store_see_committed_state() {
    let store = seeded_store(&[key(1)]);
    let mut writer = store.session();
    let mut reader = store.session();

    writer.begin().await.unwrap();
    store
        .update_processed(&mut writer, key(1), CompletionMask::from_bits(1))
        .await
        .unwrap();
    let before = store.list(&mut reader).await.unwrap();
    writer.commit().await.unwrap();
    let after = store.list(&mut reader).await.unwrap();

    assert!(before[0].processed.is_empty());
    assert_eq!(after[0].processed.bits(), 1);
}
