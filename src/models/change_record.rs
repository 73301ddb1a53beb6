use super::{CompletionMask, HandlerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery order of a backlog record.
///
/// Records of one job are ordered by `sub_sequence`; jobs are ordered by
/// `job_id`. A job that produces a single change uses `sub_sequence = -1`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SequenceKey {
    pub job_id: i64,
    pub sub_sequence: i64,
}

impl SequenceKey {
    pub fn new(job_id: i64, sub_sequence: i64) -> Self {
        Self {
            job_id,
            sub_sequence,
        }
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.job_id, self.sub_sequence)
    }
}

/// One durable unit of delivery as listed from the backlog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord<E> {
    pub key: SequenceKey,
    pub payload: E,
    pub processed: CompletionMask,
}

impl<E> ChangeRecord<E> {
    pub fn new(key: SequenceKey, payload: E) -> Self {
        Self {
            key,
            payload,
            processed: CompletionMask::EMPTY,
        }
    }

    pub fn with_processed(mut self, processed: CompletionMask) -> Self {
        self.processed = processed;
        self
    }

    pub fn is_processed_by(&self, id: HandlerId) -> bool {
        self.processed.contains(id)
    }

    /// Saturation check against the registered handler set
    pub fn is_saturated(&self, full_mask: CompletionMask) -> bool {
        self.processed == full_mask
    }
}
