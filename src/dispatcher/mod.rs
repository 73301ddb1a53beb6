//! # Dispatch Engine
//!
//! The delivery protocol: the poll loop ([`EventDispatcher`]), the atomic
//! per-(record, handler) unit of work ([`TransitionExecutor`]), and the
//! handler capability ([`ChangeHandler`]).
//!
//! All delivery work runs on one logical thread of control. There is never
//! more than one poll cycle or one handler invocation in flight, and the
//! dispatcher's single session is only ever used sequentially.

pub mod event_dispatcher;
pub mod handler;
pub mod transition_executor;

pub use event_dispatcher::{CycleReport, DispatcherState, EventDispatcher};
pub use handler::{ChangeHandler, HandlerContext, HandlerError, HandlerOutcome};
pub use transition_executor::{
    DeliveryAttempt, DeliveryError, DeliveryOutcome, TransitionExecutor,
};
