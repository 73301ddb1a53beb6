//! # Backlog Data Model
//!
//! Value types shared by the registry, the dispatcher, and the backlog stores.

pub mod change_record;
pub mod completion_mask;
pub mod handler_id;

pub use change_record::{ChangeRecord, SequenceKey};
pub use completion_mask::CompletionMask;
pub use handler_id::{HandlerId, InvalidHandlerId};
