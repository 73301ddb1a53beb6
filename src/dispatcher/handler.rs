//! # Change Handlers
//!
//! A change handler consumes backlog events inside a transaction opened by the
//! dispatcher. Whatever the handler writes through the session commits together
//! with its processed bit, or not at all.
//!
//! Handlers are delivered every event at least once: an attempt that fails
//! before commit is retried on a later poll cycle, so `handle` must tolerate
//! being called again for an event it has already seen.

use crate::models::{HandlerId, SequenceKey};
use crate::store::Session;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure detail reported by a handler
#[derive(Error, Debug)]
#[error(transparent)]
pub struct HandlerError(#[from] anyhow::Error);

impl HandlerError {
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(anyhow::Error::msg(message))
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.0
    }
}

/// Result of one handler invocation
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Event processed; its bit may be committed
    Handled,
    /// Cannot process yet; retry this same event on a later cycle
    NotReady,
    /// Genuine failure; retried on a later cycle and logged
    Failed(HandlerError),
}

impl HandlerOutcome {
    pub fn failed<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::Failed(HandlerError::msg(message))
    }

    /// Adapt a handler body written with `?`
    pub fn from_result(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Self::Handled,
            Err(e) => Self::Failed(HandlerError::from(e)),
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::NotReady => "not_ready",
            Self::Failed(_) => "failed",
        }
    }
}

impl From<anyhow::Result<()>> for HandlerOutcome {
    fn from(result: anyhow::Result<()>) -> Self {
        Self::from_result(result)
    }
}

/// Per-invocation context handed to a handler
#[derive(Debug, Clone)]
pub struct HandlerContext {
    handler_id: HandlerId,
    key: SequenceKey,
    cancellation: CancellationToken,
}

impl HandlerContext {
    pub fn new(handler_id: HandlerId, key: SequenceKey, cancellation: CancellationToken) -> Self {
        Self {
            handler_id,
            key,
            cancellation,
        }
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler_id
    }

    /// Key of the record being delivered
    pub fn record_key(&self) -> SequenceKey {
        self.key
    }

    /// Cancelled when the dispatcher is shutting down. The dispatcher never
    /// aborts a running handler; long handlers should watch this themselves.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Consumer of backlog events, registered under a fixed [`HandlerId`]
#[async_trait]
pub trait ChangeHandler<S, E>: Send + Sync
where
    S: Session,
    E: Send + Sync,
{
    /// Process one event. The session has an open transaction.
    async fn handle(&self, ctx: &HandlerContext, session: &mut S, event: &E) -> HandlerOutcome;

    /// Name used in logs
    fn name(&self) -> &str {
        "unnamed_handler"
    }
}
