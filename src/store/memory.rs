//! # In-Memory Backlog
//!
//! Process-local backlog with real transactional semantics: writes made through
//! a [`MemorySession`] are staged and only become visible on commit. Used by
//! tests, benchmarks, and embedders that do not need durability across restarts.
//!
//! Fault injection (`fail_next_*`) makes the next N calls of an operation fail,
//! which is how the failure-isolation paths of the dispatcher are exercised.

use super::{BacklogStore, Session, SessionError, SessionResult, StoreError, StoreResult};
use crate::models::{ChangeRecord, CompletionMask, SequenceKey};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredRecord<E> {
    payload: E,
    processed: CompletionMask,
}

#[derive(Debug, Default, Clone, Copy)]
struct FaultPlan {
    list: u32,
    begin: u32,
    update: u32,
    commit: u32,
    delete: u32,
}

fn take_fault(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

/// Commit/rollback counters, mostly for assertions
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreStats {
    pub commits: u64,
    pub rollbacks: u64,
    pub deleted: u64,
}

#[derive(Debug)]
struct Backlog<E> {
    records: BTreeMap<SequenceKey, StoredRecord<E>>,
    values: BTreeMap<String, Value>,
    faults: FaultPlan,
    stats: MemoryStoreStats,
}

impl<E> Default for Backlog<E> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            values: BTreeMap::new(),
            faults: FaultPlan::default(),
            stats: MemoryStoreStats::default(),
        }
    }
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Processed {
        key: SequenceKey,
        processed: CompletionMask,
    },
    Delete {
        key: SequenceKey,
    },
    Put {
        key: String,
        value: Value,
    },
}

/// Shared handle to an in-process backlog. Clones see the same records.
#[derive(Debug)]
pub struct InMemoryBacklogStore<E> {
    inner: Arc<Mutex<Backlog<E>>>,
}

impl<E> Clone for InMemoryBacklogStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for InMemoryBacklogStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> InMemoryBacklogStore<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Backlog::default())),
        }
    }

    /// A session bound to this backlog
    pub fn session(&self) -> MemorySession<E> {
        MemorySession {
            inner: Arc::clone(&self.inner),
            pending: None,
        }
    }

    /// Producer side: add a record with an empty processed flag
    pub fn append(&self, key: SequenceKey, payload: E) -> StoreResult<()> {
        let mut backlog = self.inner.lock();
        if backlog.records.contains_key(&key) {
            return Err(StoreError::DuplicateRecord { key });
        }
        backlog.records.insert(
            key,
            StoredRecord {
                payload,
                processed: CompletionMask::EMPTY,
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    pub fn contains(&self, key: SequenceKey) -> bool {
        self.inner.lock().records.contains_key(&key)
    }

    pub fn keys(&self) -> Vec<SequenceKey> {
        self.inner.lock().records.keys().copied().collect()
    }

    /// Committed processed flag of a record
    pub fn processed(&self, key: SequenceKey) -> Option<CompletionMask> {
        self.inner.lock().records.get(&key).map(|r| r.processed)
    }

    /// Committed value written by a handler through [`MemorySession::put`]
    pub fn value(&self, key: &str) -> Option<Value> {
        self.inner.lock().values.get(key).cloned()
    }

    pub fn stats(&self) -> MemoryStoreStats {
        self.inner.lock().stats
    }

    pub fn fail_next_list(&self, times: u32) {
        self.inner.lock().faults.list = times;
    }

    pub fn fail_next_begin(&self, times: u32) {
        self.inner.lock().faults.begin = times;
    }

    pub fn fail_next_update(&self, times: u32) {
        self.inner.lock().faults.update = times;
    }

    pub fn fail_next_commit(&self, times: u32) {
        self.inner.lock().faults.commit = times;
    }

    pub fn fail_next_delete(&self, times: u32) {
        self.inner.lock().faults.delete = times;
    }
}

impl<E: Clone> InMemoryBacklogStore<E> {
    pub fn get(&self, key: SequenceKey) -> Option<ChangeRecord<E>> {
        self.inner.lock().records.get(&key).map(|stored| {
            ChangeRecord::new(key, stored.payload.clone()).with_processed(stored.processed)
        })
    }
}

/// Session over an [`InMemoryBacklogStore`]
#[derive(Debug)]
pub struct MemorySession<E> {
    inner: Arc<Mutex<Backlog<E>>>,
    pending: Option<Vec<PendingWrite>>,
}

impl<E> MemorySession<E> {
    /// Stage a key/value write in the open transaction
    pub fn put(&mut self, key: impl Into<String>, value: Value) -> SessionResult<()> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| SessionError::no_active_transaction("put"))?;
        pending.push(PendingWrite::Put {
            key: key.into(),
            value,
        });
        Ok(())
    }

    fn stage(&mut self, operation: &str, write: PendingWrite) -> SessionResult<()> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| SessionError::no_active_transaction(operation))?;
        pending.push(write);
        Ok(())
    }
}

#[async_trait]
impl<E: Send> Session for MemorySession<E> {
    async fn begin(&mut self) -> SessionResult<()> {
        if self.pending.is_some() {
            return Err(SessionError::AlreadyInTransaction);
        }
        if take_fault(&mut self.inner.lock().faults.begin) {
            return Err(SessionError::begin("injected begin failure"));
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> SessionResult<()> {
        let writes = self
            .pending
            .take()
            .ok_or_else(|| SessionError::no_active_transaction("commit"))?;

        let mut backlog = self.inner.lock();
        if take_fault(&mut backlog.faults.commit) {
            backlog.stats.rollbacks += 1;
            return Err(SessionError::commit("injected commit failure"));
        }

        for write in writes {
            match write {
                PendingWrite::Processed { key, processed } => {
                    if let Some(record) = backlog.records.get_mut(&key) {
                        record.processed = processed;
                    }
                }
                PendingWrite::Delete { key } => {
                    if backlog.records.remove(&key).is_some() {
                        backlog.stats.deleted += 1;
                    }
                }
                PendingWrite::Put { key, value } => {
                    backlog.values.insert(key, value);
                }
            }
        }
        backlog.stats.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        if let Some(discarded) = self.pending.take() {
            debug!(writes = discarded.len(), "Rolled back in-memory transaction");
            self.inner.lock().stats.rollbacks += 1;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }
}

#[async_trait]
impl<E> BacklogStore for InMemoryBacklogStore<E>
where
    E: Clone + Send + Sync + 'static,
{
    type Session = MemorySession<E>;
    type Event = E;

    async fn list(&self, _session: &mut MemorySession<E>) -> StoreResult<Vec<ChangeRecord<E>>> {
        let mut backlog = self.inner.lock();
        if take_fault(&mut backlog.faults.list) {
            return Err(StoreError::unavailable("list"));
        }
        Ok(backlog
            .records
            .iter()
            .map(|(key, stored)| {
                ChangeRecord::new(*key, stored.payload.clone()).with_processed(stored.processed)
            })
            .collect())
    }

    async fn update_processed(
        &self,
        session: &mut MemorySession<E>,
        key: SequenceKey,
        processed: CompletionMask,
    ) -> StoreResult<()> {
        if !session.in_transaction() {
            return Err(SessionError::no_active_transaction("update_processed").into());
        }
        {
            let mut backlog = self.inner.lock();
            if take_fault(&mut backlog.faults.update) {
                return Err(StoreError::unavailable("update_processed"));
            }
            if !backlog.records.contains_key(&key) {
                return Err(StoreError::RecordNotFound { key });
            }
        }
        session.stage("update_processed", PendingWrite::Processed { key, processed })?;
        Ok(())
    }

    async fn delete_and_commit(
        &self,
        session: &mut MemorySession<E>,
        key: SequenceKey,
    ) -> StoreResult<()> {
        session.begin().await?;

        let injected = take_fault(&mut self.inner.lock().faults.delete);
        if injected {
            session.rollback().await?;
            return Err(StoreError::unavailable("delete_and_commit"));
        }

        session.stage("delete_and_commit", PendingWrite::Delete { key })?;
        session.commit().await?;
        Ok(())
    }
}
