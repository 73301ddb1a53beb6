//! Proptest strategies for backlog contents and handler sets

use change_notifier::models::SequenceKey;
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;

/// Any raw identity, valid or not
pub fn raw_handler_id_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        8 => 0i64..64,
        1 => i64::MIN..0,
        1 => 64i64..i64::MAX,
    ]
}

/// Distinct valid identities
pub fn handler_set_strategy(max: usize) -> impl Strategy<Value = Vec<i64>> {
    btree_set(0i64..64, 1..=max).prop_map(|ids| ids.into_iter().collect())
}

/// Distinct keys in arbitrary (unsorted) order
pub fn sequence_keys_strategy(max: usize) -> impl Strategy<Value = Vec<SequenceKey>> {
    btree_set((1i64..1_000, -1i64..4), 1..=max)
        .prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(job_id, sub)| SequenceKey::new(job_id, sub))
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// One success/not-ready flag per (record, attempt)
pub fn readiness_strategy(len: usize) -> impl Strategy<Value = Vec<bool>> {
    vec(any::<bool>(), len)
}
