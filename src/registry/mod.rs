//! # Registry Infrastructure
//!
//! Setup-time registration of change handlers.
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use change_notifier::dispatcher::{ChangeHandler, HandlerContext, HandlerOutcome};
//! use change_notifier::registry::HandlerRegistry;
//! use change_notifier::store::MemorySession;
//!
//! struct StatsRefresher;
//!
//! #[async_trait]
//! impl ChangeHandler<MemorySession<String>, String> for StatsRefresher {
//!     async fn handle(
//!         &self,
//!         _ctx: &HandlerContext,
//!         _session: &mut MemorySession<String>,
//!         _event: &String,
//!     ) -> HandlerOutcome {
//!         HandlerOutcome::Handled
//!     }
//! }
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(0, StatsRefresher).unwrap();
//! assert_eq!(registry.full_mask().bits(), 1);
//! ```

pub mod handler_registry;

pub use handler_registry::{HandlerRegistry, RegisteredHandler, RegistryError};
