//! # System Constants
//!
//! Operational boundaries of the change notifier.

use std::time::Duration;

/// Handler identities map onto the bits of a 64-bit processed flag
pub const MAX_HANDLERS: usize = 64;

/// Handler invocations taking longer than this are reported at warn level
pub const DEFAULT_SLOW_HANDLER_THRESHOLD: Duration = Duration::from_secs(5);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_BACKLOG_TABLE: &str = "change_notifier_backlog";

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CHANGE_NOTIFIER";
