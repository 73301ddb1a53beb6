//! Poll loop timing, cancellation and lifecycle states

use crate::common::*;
use async_trait::async_trait;
use change_notifier::dispatcher::{ChangeHandler, DispatcherState, HandlerContext, HandlerOutcome};
use change_notifier::error::NotifierError;
use change_notifier::models::SequenceKey;
use change_notifier::store::MemorySession;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cancels the run on its first invocation and records what each
/// invocation's context reported
struct ShutdownTrigger {
    shutdown: CancellationToken,
    seen: Arc<Mutex<Vec<(SequenceKey, bool)>>>,
}

#[async_trait]
impl ChangeHandler<MemorySession<String>, String> for ShutdownTrigger {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        _session: &mut MemorySession<String>,
        _event: &String,
    ) -> HandlerOutcome {
        let cancelled_on_entry = ctx.is_cancelled();
        self.shutdown.cancel();
        self.seen.lock().push((ctx.record_key(), cancelled_on_entry));
        HandlerOutcome::Handled
    }
}

#[tokio::test(start_paused = true)]
async fn test_poll_loop_runs_one_cycle_per_interval() {
    let store = seeded_store(&[key(1), key(2)]);
    let log = CallLog::default();
    let mut dispatcher = dispatcher_for(&store);
    dispatcher
        .register(0, ScriptedHandler::new("steady", &log))
        .unwrap();

    let shutdown = CancellationToken::new();
    let running = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let result = dispatcher.start(shutdown).await;
            (dispatcher, result)
        }
    });

    // first poll waits a full interval
    tokio::time::sleep(POLL_INTERVAL / 2).await;
    assert_eq!(store.len(), 2);
    assert_eq!(log.len(), 0);

    tokio::time::sleep(POLL_INTERVAL).await;
    assert!(store.is_empty());

    store.append(key(3), "event-3".to_string()).unwrap();
    tokio::time::sleep(POLL_INTERVAL).await;
    assert!(store.is_empty());

    shutdown.cancel();
    let (dispatcher, result) = running.await.unwrap();
    result.unwrap();

    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    assert_eq!(dispatcher.cycles(), 2);
    assert_eq!(log.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_listing_failure_does_not_stop_loop() {
    let store = seeded_store(&[key(1)]);
    let log = CallLog::default();
    let mut dispatcher = dispatcher_for(&store);
    dispatcher
        .register(0, ScriptedHandler::new("steady", &log))
        .unwrap();
    store.fail_next_list(2);

    let shutdown = CancellationToken::new();
    let running = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let result = dispatcher.start(shutdown).await;
            (dispatcher, result)
        }
    });

    tokio::time::sleep(POLL_INTERVAL * 2 + POLL_INTERVAL / 2).await;
    assert!(store.contains(key(1)));

    tokio::time::sleep(POLL_INTERVAL).await;
    assert!(store.is_empty());

    shutdown.cancel();
    let (dispatcher, result) = running.await.unwrap();
    result.unwrap();
    // failed listings do not count as completed cycles
    assert_eq!(dispatcher.cycles(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_mid_cycle_finishes_the_cycle() {
    let keys = [key(1), key(2), key(3)];
    let store = seeded_store(&keys);
    let shutdown = CancellationToken::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = dispatcher_for(&store);
    dispatcher
        .register(
            0,
            ShutdownTrigger {
                shutdown: shutdown.clone(),
                seen: Arc::clone(&seen),
            },
        )
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), dispatcher.start(shutdown))
        .await
        .expect("loop exits after the cancelled cycle")
        .unwrap();

    assert_eq!(
        *seen.lock(),
        vec![(keys[0], false), (keys[1], true), (keys[2], true)]
    );
    assert!(store.is_empty());
    assert_eq!(dispatcher.cycles(), 1);
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
}

#[tokio::test]
async fn test_stopped_dispatcher_does_not_poll() {
    let store = seeded_store(&[key(1)]);
    let log = CallLog::default();
    let mut dispatcher = dispatcher_for(&store);
    dispatcher
        .register(0, ScriptedHandler::new("steady", &log))
        .unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    dispatcher.start(shutdown).await.unwrap();

    assert!(matches!(
        dispatcher.process_events().await,
        Err(NotifierError::InvalidState(_))
    ));
    assert_eq!(log.len(), 0);
    assert!(store.contains(key(1)));
}

#[tokio::test]
async fn test_cancelled_before_start_processes_nothing() {
    let store = seeded_store(&[key(1)]);
    let log = CallLog::default();
    let mut dispatcher = dispatcher_for(&store);
    dispatcher
        .register(0, ScriptedHandler::new("steady", &log))
        .unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), dispatcher.start(shutdown))
        .await
        .expect("start returns promptly")
        .unwrap();

    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    assert_eq!(log.len(), 0);
    assert!(store.contains(key(1)));
}

#[tokio::test]
async fn test_stopped_dispatcher_cannot_restart_or_register() {
    let store = TestStore::new();
    let log = CallLog::default();
    let mut dispatcher = dispatcher_for(&store);
    assert_eq!(dispatcher.state(), DispatcherState::Ready);

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    dispatcher.start(shutdown).await.unwrap();

    assert!(matches!(
        dispatcher.start(CancellationToken::new()).await,
        Err(NotifierError::InvalidState(_))
    ));
    assert!(matches!(
        dispatcher.register(0, ScriptedHandler::new("late", &log)),
        Err(NotifierError::Registry(_))
    ));
}

#[test]
fn test_zero_poll_interval_rejected() {
    let store = TestStore::new();
    let config = change_notifier::config::DispatcherConfig::default()
        .with_poll_interval(Duration::ZERO);

    let result = change_notifier::dispatcher::EventDispatcher::new(
        store.session(),
        store.clone(),
        &config,
    );
    assert!(matches!(result, Err(NotifierError::Configuration(_))));
}
