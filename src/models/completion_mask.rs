use super::HandlerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Set of handlers that have durably processed a backlog record.
///
/// Bits are only ever added. The raw value is what the backlog persists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionMask(u64);

impl CompletionMask {
    pub const EMPTY: CompletionMask = CompletionMask(0);

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, id: HandlerId) -> bool {
        self.0 & id.bit() != 0
    }

    /// Copy of this mask with `id` marked as processed
    #[must_use]
    pub fn with(self, id: HandlerId) -> Self {
        Self(self.0 | id.bit())
    }

    pub fn insert(&mut self, id: HandlerId) {
        self.0 |= id.bit();
    }

    #[must_use]
    pub fn union(self, other: CompletionMask) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Handler identities present in the mask, lowest first
    pub fn iter(self) -> impl Iterator<Item = HandlerId> {
        (0..64i64)
            .filter(move |bit| self.0 & (1u64 << bit) != 0)
            .filter_map(|bit| HandlerId::new(bit).ok())
    }

    /// Stored representation; the flag column is a signed BIGINT
    pub fn to_db(self) -> i64 {
        self.0 as i64
    }

    pub fn from_db(raw: i64) -> Self {
        Self(raw as u64)
    }
}

impl FromIterator<HandlerId> for CompletionMask {
    fn from_iter<I: IntoIterator<Item = HandlerId>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, CompletionMask::with)
    }
}

impl fmt::Display for CompletionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
