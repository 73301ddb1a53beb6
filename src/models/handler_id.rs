//! # Handler Identity
//!
//! Persistent identity of a registered change handler. Every identity owns one
//! bit of the 64-bit processed flag stored with each backlog record, so only
//! identities in `[0, 64)` are representable.

use crate::constants::MAX_HANDLERS;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identity of a registered handler, doubling as its bit position in a
/// [`CompletionMask`](super::CompletionMask).
///
/// Values are chosen by callers and must stay stable across releases: the bit
/// is persisted with every backlog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct HandlerId(u8);

/// Raised when a raw integer cannot be used as a handler identity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal handler id {value}: must be in range [0, 64)")]
pub struct InvalidHandlerId {
    pub value: i64,
}

impl HandlerId {
    /// Validate a raw identity
    pub fn new(value: i64) -> Result<Self, InvalidHandlerId> {
        if (0..MAX_HANDLERS as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(InvalidHandlerId { value })
        }
    }

    /// Raw identity value
    pub fn value(self) -> u8 {
        self.0
    }

    /// The single bit this identity occupies in a processed flag
    pub fn bit(self) -> u64 {
        1u64 << self.0
    }
}

impl TryFrom<i64> for HandlerId {
    type Error = InvalidHandlerId;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HandlerId> for i64 {
    fn from(id: HandlerId) -> Self {
        i64::from(id.0)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerID({})", self.0)
    }
}
