//! # Transition Executor
//!
//! Executes one delivery attempt of a backlog record to one handler as an
//! atomic unit:
//!
//! ```text
//! bit already set? ──yes──> AlreadyDelivered (no transaction)
//!        │ no
//!        ▼
//!      BEGIN ──> handler.handle(session, event)
//!                  │ Handled              │ NotReady / Failed
//!                  ▼                      ▼
//!   update_processed(old | bit)       ROLLBACK
//!                  │
//!                COMMIT ──fail──> ROLLBACK, Failed
//!                  │
//!                  ▼
//!   record.processed |= bit, Delivered
//! ```
//!
//! The in-memory processed flag only changes after a successful commit.

use super::handler::{ChangeHandler, HandlerContext, HandlerError, HandlerOutcome};
use crate::constants::DEFAULT_SLOW_HANDLER_THRESHOLD;
use crate::models::{ChangeRecord, CompletionMask, HandlerId, SequenceKey};
use crate::store::{BacklogStore, Session, SessionError, StoreError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a delivery attempt left no durable progress
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("handler failed: {0}")]
    Handler(#[source] HandlerError),

    #[error("failed to begin transaction: {0}")]
    Begin(#[source] SessionError),

    #[error("failed to persist processed flag: {0}")]
    Persist(#[source] StoreError),

    #[error("failed to commit processed flag: {0}")]
    Commit(#[source] SessionError),
}

#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Bit was already set; handler not invoked
    AlreadyDelivered,
    /// Handler succeeded and its bit was committed
    Delivered,
    /// Handler asked to be retried later
    NotReady,
    Failed(DeliveryError),
}

impl DeliveryOutcome {
    /// Whether the handler is done with this record
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AlreadyDelivered | Self::Delivered)
    }
}

/// Outcome plus timing of one attempt
#[derive(Debug)]
pub struct DeliveryAttempt {
    pub outcome: DeliveryOutcome,
    /// Wall-clock time spent inside the handler, if it was invoked
    pub handler_elapsed: Option<Duration>,
    /// Whether the invocation exceeded the slow-handler threshold
    pub slow: bool,
}

impl DeliveryAttempt {
    fn without_invocation(outcome: DeliveryOutcome) -> Self {
        Self {
            outcome,
            handler_elapsed: None,
            slow: false,
        }
    }
}

/// Runs (record, handler) delivery attempts
#[derive(Debug, Clone)]
pub struct TransitionExecutor {
    slow_handler_threshold: Duration,
}

impl Default for TransitionExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_HANDLER_THRESHOLD)
    }
}

impl TransitionExecutor {
    pub fn new(slow_handler_threshold: Duration) -> Self {
        Self {
            slow_handler_threshold,
        }
    }

    pub fn slow_handler_threshold(&self) -> Duration {
        self.slow_handler_threshold
    }

    /// Strictly longer than the threshold
    pub fn is_slow(&self, elapsed: Duration) -> bool {
        elapsed > self.slow_handler_threshold
    }

    /// Deliver `record` to `handler` inside one transaction on `session`
    pub async fn execute<B>(
        &self,
        store: &B,
        session: &mut B::Session,
        record: &mut ChangeRecord<B::Event>,
        handler_id: HandlerId,
        handler: &dyn ChangeHandler<B::Session, B::Event>,
        cancellation: &CancellationToken,
    ) -> DeliveryAttempt
    where
        B: BacklogStore,
    {
        if record.is_processed_by(handler_id) {
            return DeliveryAttempt::without_invocation(DeliveryOutcome::AlreadyDelivered);
        }

        if let Err(e) = session.begin().await {
            return DeliveryAttempt::without_invocation(DeliveryOutcome::Failed(
                DeliveryError::Begin(e),
            ));
        }

        let ctx = HandlerContext::new(handler_id, record.key, cancellation.child_token());
        let started = Instant::now();
        let outcome = handler.handle(&ctx, session, &record.payload).await;
        let elapsed = started.elapsed();

        let slow = self.is_slow(elapsed);
        if slow {
            warn!(
                handler = %handler_id,
                handler_name = handler.name(),
                job_id = record.key.job_id,
                sub_sequence = record.key.sub_sequence,
                outcome = outcome.label(),
                duration_ms = elapsed.as_millis() as u64,
                "Slow process event"
            );
        }

        let outcome = match outcome {
            HandlerOutcome::Handled => {
                let processed = record.processed.with(handler_id);
                match self
                    .persist(store, session, record.key, processed, handler_id)
                    .await
                {
                    Ok(()) => {
                        record.processed = processed;
                        DeliveryOutcome::Delivered
                    }
                    Err(e) => DeliveryOutcome::Failed(e),
                }
            }
            HandlerOutcome::NotReady => {
                rollback_quietly(session, handler_id, record.key).await;
                DeliveryOutcome::NotReady
            }
            HandlerOutcome::Failed(e) => {
                rollback_quietly(session, handler_id, record.key).await;
                DeliveryOutcome::Failed(DeliveryError::Handler(e))
            }
        };

        DeliveryAttempt {
            outcome,
            handler_elapsed: Some(elapsed),
            slow,
        }
    }

    async fn persist<B>(
        &self,
        store: &B,
        session: &mut B::Session,
        key: SequenceKey,
        processed: CompletionMask,
        handler_id: HandlerId,
    ) -> Result<(), DeliveryError>
    where
        B: BacklogStore,
    {
        if let Err(e) = store.update_processed(session, key, processed).await {
            rollback_quietly(session, handler_id, key).await;
            return Err(DeliveryError::Persist(e));
        }

        if let Err(e) = session.commit().await {
            // a failed commit may leave the transaction open on some sessions
            rollback_quietly(session, handler_id, key).await;
            return Err(DeliveryError::Commit(e));
        }

        debug!(
            handler = %handler_id,
            job_id = key.job_id,
            sub_sequence = key.sub_sequence,
            processed = %processed,
            "Committed processed flag"
        );
        Ok(())
    }
}

async fn rollback_quietly<S: Session>(session: &mut S, handler_id: HandlerId, key: SequenceKey) {
    if let Err(e) = session.rollback().await {
        warn!(
            handler = %handler_id,
            job_id = key.job_id,
            sub_sequence = key.sub_sequence,
            error = %e,
            "Rollback failed"
        );
    }
}
