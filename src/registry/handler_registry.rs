//! # Handler Registry
//!
//! Fixed-capacity table of change handlers keyed by [`HandlerId`].
//!
//! Registration is a single-threaded setup step: every handler must be
//! registered before the dispatcher starts, at which point the registry is
//! frozen and its identity set becomes the full mask used for saturation
//! checks. Iteration order across handlers is unspecified.

use crate::dispatcher::handler::ChangeHandler;
use crate::models::{CompletionMask, HandlerId, InvalidHandlerId};
use crate::store::Session;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Setup-time registration failures. None of these can occur at runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidId(#[from] InvalidHandlerId),

    #[error("{id} already registered")]
    Duplicate { id: HandlerId },

    #[error("cannot register {id}: handler registry is frozen once dispatch has started")]
    Frozen { id: HandlerId },
}

/// Registration record for one handler
pub struct RegisteredHandler<S, E>
where
    S: Session,
    E: Send + Sync,
{
    pub id: HandlerId,
    pub handler: Arc<dyn ChangeHandler<S, E>>,
    pub registered_at: DateTime<Utc>,
}

impl<S, E> std::fmt::Debug for RegisteredHandler<S, E>
where
    S: Session,
    E: Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("id", &self.id)
            .field("name", &self.handler.name())
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Identity → handler table
pub struct HandlerRegistry<S, E>
where
    S: Session,
    E: Send + Sync,
{
    handlers: HashMap<HandlerId, RegisteredHandler<S, E>>,
    full_mask: CompletionMask,
    frozen: bool,
}

impl<S, E> std::fmt::Debug for HandlerRegistry<S, E>
where
    S: Session,
    E: Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.values().collect::<Vec<_>>())
            .field("full_mask", &self.full_mask)
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl<S, E> Default for HandlerRegistry<S, E>
where
    S: Session,
    E: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E> HandlerRegistry<S, E>
where
    S: Session,
    E: Send + Sync,
{
    pub fn new() -> Self {
        Self {
            handlers: HashMap::with_capacity(crate::constants::MAX_HANDLERS),
            full_mask: CompletionMask::EMPTY,
            frozen: false,
        }
    }

    /// Register a handler under a caller-chosen identity in `[0, 64)`
    pub fn register<H>(&mut self, id: i64, handler: H) -> Result<HandlerId, RegistryError>
    where
        H: ChangeHandler<S, E> + 'static,
    {
        self.register_shared(id, Arc::new(handler))
    }

    /// Register a handler that is shared with other owners
    pub fn register_shared(
        &mut self,
        id: i64,
        handler: Arc<dyn ChangeHandler<S, E>>,
    ) -> Result<HandlerId, RegistryError> {
        let id = HandlerId::new(id)?;

        if self.frozen {
            return Err(RegistryError::Frozen { id });
        }
        if self.handlers.contains_key(&id) {
            return Err(RegistryError::Duplicate { id });
        }

        info!(
            handler = %id,
            handler_name = handler.name(),
            "Registered change handler"
        );
        self.handlers.insert(
            id,
            RegisteredHandler {
                id,
                handler,
                registered_at: Utc::now(),
            },
        );
        self.full_mask.insert(id);
        Ok(id)
    }

    /// Stop accepting registrations and return the full mask
    pub fn freeze(&mut self) -> CompletionMask {
        self.frozen = true;
        self.full_mask
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Bitwise OR of every registered identity
    pub fn full_mask(&self) -> CompletionMask {
        self.full_mask
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn get(&self, id: HandlerId) -> Option<&Arc<dyn ChangeHandler<S, E>>> {
        self.handlers.get(&id).map(|registered| &registered.handler)
    }

    /// Registered handlers in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (HandlerId, &Arc<dyn ChangeHandler<S, E>>)> {
        self.handlers
            .iter()
            .map(|(id, registered)| (*id, &registered.handler))
    }

    pub fn registrations(&self) -> impl Iterator<Item = &RegisteredHandler<S, E>> {
        self.handlers.values()
    }
}
