//! # Backlog Storage Interfaces
//!
//! The dispatcher never talks to a database directly. It drives a [`Session`]
//! (one reusable transactional connection) and a [`BacklogStore`] (the durable
//! ordered log of pending change records).
//!
//! ## Contract
//!
//! - [`BacklogStore::list`] returns the whole current backlog in ascending
//!   [`SequenceKey`] order. It is the authoritative state; the dispatcher keeps
//!   nothing between poll cycles.
//! - [`BacklogStore::update_processed`] must run inside the caller's active
//!   transaction so it commits or rolls back together with the handler's writes.
//! - [`BacklogStore::delete_and_commit`] performs its own begin/commit.
//!
//! ## Implementations
//!
//! - [`memory::InMemoryBacklogStore`]: in-process, transactional, with fault injection
//! - [`postgres::PgBacklogStore`]: PostgreSQL via sqlx

use crate::models::{ChangeRecord, CompletionMask, SequenceKey};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{InMemoryBacklogStore, MemorySession};
#[cfg(feature = "postgres")]
pub use postgres::{PgBacklogStore, PgSession};

/// Errors raised by the transactional session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to connect: {message}")]
    Connect { message: String },

    #[error("Failed to begin transaction: {message}")]
    Begin { message: String },

    #[error("Failed to commit transaction: {message}")]
    Commit { message: String },

    #[error("Failed to roll back transaction: {message}")]
    Rollback { message: String },

    #[error("Session already has an active transaction")]
    AlreadyInTransaction,

    #[error("Operation {operation} requires an active transaction")]
    NoActiveTransaction { operation: String },

    #[error("Session write failed: {message}")]
    Write { message: String },
}

impl SessionError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    pub fn begin(message: impl Into<String>) -> Self {
        Self::Begin {
            message: message.into(),
        }
    }

    pub fn commit(message: impl Into<String>) -> Self {
        Self::Commit {
            message: message.into(),
        }
    }

    pub fn rollback(message: impl Into<String>) -> Self {
        Self::Rollback {
            message: message.into(),
        }
    }

    pub fn no_active_transaction(operation: impl Into<String>) -> Self {
        Self::NoActiveTransaction {
            operation: operation.into(),
        }
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors raised by backlog operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error during {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Failed to decode backlog record {key}: {message}")]
    Decode { key: SequenceKey, message: String },

    #[error("Backlog record {key} not found")]
    RecordNotFound { key: SequenceKey },

    #[error("Backlog record {key} already exists")]
    DuplicateRecord { key: SequenceKey },

    #[error("Backlog unavailable during {operation}")]
    Unavailable { operation: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl StoreError {
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(operation: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One transactional connection, reused sequentially by the dispatcher.
///
/// At most one transaction is open at a time. Handlers receive the session
/// while its transaction is open and write through it.
#[async_trait]
pub trait Session: Send {
    async fn begin(&mut self) -> SessionResult<()>;

    async fn commit(&mut self) -> SessionResult<()>;

    /// Discard the open transaction. A session without one is left untouched.
    async fn rollback(&mut self) -> SessionResult<()>;

    fn in_transaction(&self) -> bool;
}

/// Durable ordered log of pending change records and their processed flags
#[async_trait]
pub trait BacklogStore: Send + Sync {
    type Session: Session;
    type Event: Send + Sync;

    /// Whole backlog, ascending by sequence key
    async fn list(
        &self,
        session: &mut Self::Session,
    ) -> StoreResult<Vec<ChangeRecord<Self::Event>>>;

    /// Persist a new processed flag inside the session's active transaction
    async fn update_processed(
        &self,
        session: &mut Self::Session,
        key: SequenceKey,
        processed: CompletionMask,
    ) -> StoreResult<()>;

    /// Remove a record and commit on its own transaction
    async fn delete_and_commit(
        &self,
        session: &mut Self::Session,
        key: SequenceKey,
    ) -> StoreResult<()>;
}
