//! Setup-time registration failures

use crate::common::*;
use change_notifier::error::NotifierError;
use change_notifier::models::InvalidHandlerId;
use change_notifier::dispatcher::ChangeHandler;
use change_notifier::models::HandlerId;
use change_notifier::registry::RegistryError;
use change_notifier::store::MemorySession;
use std::sync::Arc;

#[test]
fn test_out_of_range_identity_rejected_before_processing() {
    let store = seeded_store(&[key(1)]);
    let log = CallLog::default();
    let mut dispatcher = dispatcher_for(&store);

    for raw in [-1, 64, 1_000] {
        let result = dispatcher.register(raw, ScriptedHandler::new("bad", &log));
        assert!(matches!(
            result,
            Err(NotifierError::Registry(RegistryError::InvalidId(InvalidHandlerId { value }))) if value == raw
        ));
    }
    assert!(dispatcher.registry().is_empty());
    assert_eq!(log.len(), 0);
    assert_eq!(store.processed(key(1)).map(|m| m.bits()), Some(0));
}

#[test]
fn test_duplicate_identity_rejected() {
    let store = TestStore::new();
    let log = CallLog::default();
    let mut dispatcher = dispatcher_for(&store);

    let first = dispatcher
        .register(17, ScriptedHandler::new("first", &log))
        .unwrap();
    let err = dispatcher
        .register(17, ScriptedHandler::new("second", &log))
        .unwrap_err();

    assert!(matches!(
        err,
        NotifierError::Registry(RegistryError::Duplicate { id }) if id == first
    ));
    assert_eq!(dispatcher.registry().len(), 1);
    assert_eq!(
        dispatcher.registry().get(first).map(|handler| handler.name()),
        Some("first")
    );
}

#[test]
fn test_boundary_identities_accepted() {
    let store = TestStore::new();
    let log = CallLog::default();
    let mut dispatcher = dispatcher_for(&store);

    dispatcher.register(0, ScriptedHandler::new("low", &log)).unwrap();
    dispatcher.register(63, ScriptedHandler::new("high", &log)).unwrap();

    assert_eq!(
        dispatcher.registry().full_mask().bits(),
        1 | (1u64 << 63)
    );
}

#[tokio::test]
async fn test_registration_closes_after_first_poll() {
    let store = seeded_store(&[key(1)]);
    let log = CallLog::default();
    let mut dispatcher = dispatcher_for(&store);
    dispatcher
        .register(0, ScriptedHandler::new("early", &log))
        .unwrap();

    let report = dispatcher.process_events().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(dispatcher.registry().is_frozen());

    let late = dispatcher.register(1, ScriptedHandler::new("late", &log));
    assert!(matches!(
        late,
        Err(NotifierError::Registry(RegistryError::Frozen { id })) if id == HandlerId::new(1).unwrap()
    ));
    assert_eq!(dispatcher.registry().full_mask().bits(), 0b1);
}

#[tokio::test]
async fn test_shared_handler_registered_under_two_identities() {
    let store = seeded_store(&[key(1), key(2)]);
    let log = CallLog::default();
    let shared: Arc<dyn ChangeHandler<MemorySession<String>, String>> =
        Arc::new(ScriptedHandler::new("fan_out", &log));
    let mut dispatcher = dispatcher_for(&store);

    let primary = dispatcher.register_shared(10, Arc::clone(&shared)).unwrap();
    let replica = dispatcher.register_shared(11, shared).unwrap();
    assert!(matches!(
        dispatcher.register_shared(11, Arc::new(ScriptedHandler::new("again", &log))),
        Err(NotifierError::Registry(RegistryError::Duplicate { .. }))
    ));

    let report = dispatcher.process_events().await.unwrap();

    assert_eq!(report.delivered, 4);
    assert_eq!(report.deleted, 2);
    assert_eq!(log.keys_for(primary), vec![key(1), key(2)]);
    assert_eq!(log.keys_for(replica), vec![key(1), key(2)]);
}
