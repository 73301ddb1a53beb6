#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Change Notifier
//!
//! Durable, multi-subscriber change delivery.
//!
//! ## Overview
//!
//! A producer appends change records to a persistent backlog. Any number of
//! handlers, each registered under a fixed identity in `[0, 64)`, must process
//! every record at least once and in order. Per-handler progress is a bit in a
//! 64-bit processed flag stored with the record, committed in the same
//! transaction as the handler's own writes. A record is deleted once every
//! registered handler's bit is set.
//!
//! ## Module Organization
//!
//! - [`models`] - Handler identities, processed flags, backlog records
//! - [`registry`] - Setup-time handler registration
//! - [`dispatcher`] - Poll loop, delivery protocol, handler capability
//! - [`store`] - Session/backlog interfaces with in-memory and PostgreSQL backends
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use change_notifier::config::DispatcherConfig;
//! use change_notifier::dispatcher::{ChangeHandler, EventDispatcher, HandlerContext, HandlerOutcome};
//! use change_notifier::models::SequenceKey;
//! use change_notifier::store::{InMemoryBacklogStore, MemorySession};
//! use tokio_util::sync::CancellationToken;
//!
//! struct CacheInvalidator;
//!
//! #[async_trait]
//! impl ChangeHandler<MemorySession<String>, String> for CacheInvalidator {
//!     async fn handle(
//!         &self,
//!         _ctx: &HandlerContext,
//!         session: &mut MemorySession<String>,
//!         table: &String,
//!     ) -> HandlerOutcome {
//!         let staged = session.put(format!("invalidated/{table}"), serde_json::json!(true));
//!         HandlerOutcome::from_result(staged.map_err(Into::into))
//!     }
//! }
//!
//! # async fn example() -> change_notifier::Result<()> {
//! let store = InMemoryBacklogStore::new();
//! store.append(SequenceKey::new(1, -1), "orders".to_string())?;
//!
//! let mut dispatcher =
//!     EventDispatcher::new(store.session(), store.clone(), &DispatcherConfig::default())?;
//! dispatcher.register(0, CacheInvalidator)?;
//!
//! let shutdown = CancellationToken::new();
//! dispatcher.start(shutdown).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod models;
pub mod registry;
pub mod store;

pub use config::{DatabaseConfig, DispatcherConfig, NotifierConfig};
pub use dispatcher::{
    ChangeHandler, CycleReport, DispatcherState, EventDispatcher, HandlerContext, HandlerOutcome,
    TransitionExecutor,
};
pub use error::{NotifierError, Result};
pub use models::{ChangeRecord, CompletionMask, HandlerId, SequenceKey};
pub use registry::{HandlerRegistry, RegistryError};
pub use store::{BacklogStore, Session};
