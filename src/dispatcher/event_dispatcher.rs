//! # Event Dispatcher
//!
//! Owns the poll loop. Every tick it lists the whole backlog and drives each
//! record, in ascending key order, through every registered handler.
//!
//! ## Lifecycle
//!
//! ```text
//! new() ──> Ready ──start()──> Running ──cancel──> Stopped
//! ```
//!
//! `start` blocks until the cancellation token fires and cannot be called
//! again afterwards. Cancellation is only observed between poll cycles.
//!
//! ## Ordering
//!
//! A handler that does not finish a record (not ready, or any failure) is put
//! in the cycle's skip set and sees no later record until the next cycle, when
//! it is retried from the first record it has not processed. Other handlers
//! keep going. A record is deleted once its processed flag equals the full
//! mask of registered handlers.

use super::handler::ChangeHandler;
use super::transition_executor::{DeliveryOutcome, TransitionExecutor};
use crate::config::DispatcherConfig;
use crate::error::{NotifierError, Result};
use crate::models::HandlerId;
use crate::registry::HandlerRegistry;
use crate::store::BacklogStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// Constructed; handlers may still be registered
    Ready,
    /// Poll loop active; registry frozen
    Running,
    /// Cancellation observed; terminal
    Stopped,
}

/// Counters for one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub listed: usize,
    pub delivered: usize,
    pub already_delivered: usize,
    pub not_ready: usize,
    pub failed: usize,
    /// (record, handler) pairs passed over because the handler was in the skip set
    pub skipped: usize,
    pub deleted: usize,
    pub delete_failures: usize,
    pub slow: usize,
    pub elapsed_ms: u64,
}

impl CycleReport {
    pub fn made_progress(&self) -> bool {
        self.delivered > 0 || self.deleted > 0
    }
}

pub struct EventDispatcher<B: BacklogStore> {
    id: Uuid,
    session: B::Session,
    store: B,
    registry: HandlerRegistry<B::Session, B::Event>,
    executor: TransitionExecutor,
    poll_interval: Duration,
    state: DispatcherState,
    cancellation: CancellationToken,
    cycles: u64,
}

impl<B: BacklogStore> std::fmt::Debug for EventDispatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("id", &self.id)
            .field("registry", &self.registry)
            .field("executor", &self.executor)
            .field("poll_interval", &self.poll_interval)
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .finish()
    }
}

impl<B: BacklogStore> EventDispatcher<B> {
    /// Build a dispatcher owning `session`. Fails on an invalid configuration.
    pub fn new(session: B::Session, store: B, config: &DispatcherConfig) -> Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4();
        info!(
            dispatcher_id = %id,
            poll_interval_ms = config.poll_interval_ms,
            slow_handler_threshold_ms = config.slow_handler_threshold_ms,
            "Change notifier dispatcher initialized"
        );

        Ok(Self {
            id,
            session,
            store,
            registry: HandlerRegistry::new(),
            executor: TransitionExecutor::new(config.slow_handler_threshold()),
            poll_interval: config.poll_interval(),
            state: DispatcherState::Ready,
            cancellation: CancellationToken::new(),
            cycles: 0,
        })
    }

    /// Register a handler. Only allowed before the first poll cycle.
    pub fn register<H>(&mut self, id: i64, handler: H) -> Result<HandlerId>
    where
        H: ChangeHandler<B::Session, B::Event> + 'static,
    {
        Ok(self.registry.register(id, handler)?)
    }

    pub fn register_shared(
        &mut self,
        id: i64,
        handler: Arc<dyn ChangeHandler<B::Session, B::Event>>,
    ) -> Result<HandlerId> {
        Ok(self.registry.register_shared(id, handler)?)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Completed poll cycles, including ones run through [`process_events`](Self::process_events)
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn registry(&self) -> &HandlerRegistry<B::Session, B::Event> {
        &self.registry
    }

    pub fn store(&self) -> &B {
        &self.store
    }

    /// Run the poll loop until `shutdown` is cancelled
    pub async fn start(&mut self, shutdown: CancellationToken) -> Result<()> {
        if self.state != DispatcherState::Ready {
            return Err(NotifierError::InvalidState(format!(
                "dispatcher {} cannot start from state {:?}",
                self.id, self.state
            )));
        }

        let full_mask = self.registry.freeze();
        if self.registry.is_empty() {
            warn!(
                dispatcher_id = %self.id,
                "No change handlers registered; every backlog record will be deleted unprocessed"
            );
        }

        self.cancellation = shutdown;
        self.state = DispatcherState::Running;
        info!(
            dispatcher_id = %self.id,
            handlers = self.registry.len(),
            full_mask = %full_mask,
            "Change notifier started"
        );

        let span = info_span!("change_notifier", dispatcher_id = %self.id);
        self.run().instrument(span).await;

        self.state = DispatcherState::Stopped;
        info!(
            dispatcher_id = %self.id,
            cycles = self.cycles,
            "Change notifier stopped"
        );
        Ok(())
    }

    async fn run(&mut self) {
        let cancellation = self.cancellation.clone();
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    debug!("Cancellation received");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.process_events().await {
                error!(error = %e, "Error processing events");
            }
        }
    }

    /// Run exactly one poll cycle.
    ///
    /// The first cycle freezes the registry, as [`start`](Self::start) does.
    /// Returns `Err` when the dispatcher is stopped or the backlog could not
    /// be listed; in both cases nothing was processed.
    pub async fn process_events(&mut self) -> Result<CycleReport> {
        if self.state == DispatcherState::Stopped {
            return Err(NotifierError::InvalidState(format!(
                "dispatcher {} is stopped",
                self.id
            )));
        }
        self.registry.freeze();

        let started = Instant::now();
        let mut records = self.store.list(&mut self.session).await?;
        // per-handler ordering depends on ascending keys
        records.sort_by_key(|record| record.key);

        let full_mask = self.registry.full_mask();
        let mut report = CycleReport {
            listed: records.len(),
            ..CycleReport::default()
        };
        let mut skip_handlers: HashSet<HandlerId> = HashSet::new();

        for record in records.iter_mut() {
            for (handler_id, handler) in self.registry.iter() {
                if skip_handlers.contains(&handler_id) {
                    report.skipped += 1;
                    continue;
                }

                let attempt = self
                    .executor
                    .execute(
                        &self.store,
                        &mut self.session,
                        record,
                        handler_id,
                        handler.as_ref(),
                        &self.cancellation,
                    )
                    .await;
                if attempt.slow {
                    report.slow += 1;
                }

                match attempt.outcome {
                    DeliveryOutcome::AlreadyDelivered => report.already_delivered += 1,
                    DeliveryOutcome::Delivered => report.delivered += 1,
                    DeliveryOutcome::NotReady => {
                        skip_handlers.insert(handler_id);
                        report.not_ready += 1;
                        debug!(
                            job_id = record.key.job_id,
                            sub_sequence = record.key.sub_sequence,
                            handler = %handler_id,
                            handler_name = handler.name(),
                            "Handler not ready, retrying next cycle"
                        );
                    }
                    DeliveryOutcome::Failed(e) => {
                        skip_handlers.insert(handler_id);
                        report.failed += 1;
                        error!(
                            job_id = record.key.job_id,
                            sub_sequence = record.key.sub_sequence,
                            handler = %handler_id,
                            handler_name = handler.name(),
                            error = %e,
                            "Error processing change"
                        );
                    }
                }
            }

            if record.is_saturated(full_mask) {
                match self
                    .store
                    .delete_and_commit(&mut self.session, record.key)
                    .await
                {
                    Ok(()) => {
                        report.deleted += 1;
                        debug!(
                            job_id = record.key.job_id,
                            sub_sequence = record.key.sub_sequence,
                            "Deleted fully processed change"
                        );
                    }
                    Err(e) => {
                        report.delete_failures += 1;
                        error!(
                            job_id = record.key.job_id,
                            sub_sequence = record.key.sub_sequence,
                            error = %e,
                            "Error deleting change"
                        );
                    }
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        self.cycles += 1;
        self.log_cycle(&report);
        Ok(report)
    }

    fn log_cycle(&self, report: &CycleReport) {
        if report.made_progress() {
            info!(
                cycle = self.cycles,
                listed = report.listed,
                delivered = report.delivered,
                deleted = report.deleted,
                not_ready = report.not_ready,
                failed = report.failed,
                elapsed_ms = report.elapsed_ms,
                "Poll cycle complete"
            );
        } else {
            debug!(
                cycle = self.cycles,
                listed = report.listed,
                not_ready = report.not_ready,
                failed = report.failed,
                "Poll cycle complete"
            );
        }
    }
}
