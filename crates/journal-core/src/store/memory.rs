//! In-process document store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};

use super::{
    CollectionPath, Document, DocumentWrite, RemoteStore, SnapshotSender, StoreError, StoreResult,
    Subscription,
};
use crate::models::DocumentId;
use crate::util::unix_millis_now;

/// Store operation, used to script failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    Merge,
    Delete,
    Watch,
}

type Collection = BTreeMap<DocumentId, Map<String, Value>>;

#[derive(Default)]
struct MemoryState {
    collections: HashMap<CollectionPath, Collection>,
    watchers: HashMap<CollectionPath, Vec<SnapshotSender>>,
    scripted_failures: HashMap<StoreOp, VecDeque<StoreError>>,
    calls: HashMap<StoreOp, usize>,
    last_timestamp: i64,
}

impl MemoryState {
    /// Server clock: wall time, forced strictly increasing so creation order
    /// is always recoverable from `createdAt`.
    fn next_timestamp(&mut self) -> i64 {
        let now = unix_millis_now().max(self.last_timestamp + 1);
        self.last_timestamp = now;
        now
    }

    fn begin(&mut self, op: StoreOp) -> StoreResult<()> {
        *self.calls.entry(op).or_default() += 1;
        match self
            .scripted_failures
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn snapshot(&self, path: &CollectionPath) -> Vec<Document> {
        self.collections
            .get(path)
            .map(|collection| {
                collection
                    .iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn broadcast(&mut self, path: &CollectionPath) {
        let snapshot = self.snapshot(path);
        if let Some(senders) = self.watchers.get_mut(path) {
            senders.retain(|sender| sender.send(Ok(snapshot.clone())).is_ok());
        }
    }
}

/// Shared in-memory implementation of [`RemoteStore`].
///
/// Clones share state, so a test can keep one handle for inspection while the
/// controller owns another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Make the next `errors.len()` calls of `op` fail with the given errors.
    pub fn fail_next(&self, op: StoreOp, errors: impl IntoIterator<Item = StoreError>) {
        if let Ok(mut state) = self.lock() {
            state
                .scripted_failures
                .entry(op)
                .or_default()
                .extend(errors);
        }
    }

    /// Number of times `op` has been called, failed calls included.
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.lock()
            .map(|state| state.calls.get(&op).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Watchers on `path` whose subscriber is still listening.
    pub fn active_watchers(&self, path: &CollectionPath) -> usize {
        self.lock()
            .map(|state| {
                state.watchers.get(path).map_or(0, |senders| {
                    senders.iter().filter(|sender| !sender.is_closed()).count()
                })
            })
            .unwrap_or_default()
    }

    /// Current documents of a collection, ordered by id.
    pub fn documents(&self, path: &CollectionPath) -> Vec<Document> {
        self.lock()
            .map(|state| state.snapshot(path))
            .unwrap_or_default()
    }

    /// Write a document exactly as given, without server timestamps, and
    /// notify watchers.
    pub fn insert_raw(&self, path: &CollectionPath, id: DocumentId, fields: Map<String, Value>) {
        if let Ok(mut state) = self.lock() {
            state
                .collections
                .entry(path.clone())
                .or_default()
                .insert(id, fields);
            state.broadcast(path);
        }
    }

    /// End every watch on `path` with `error`.
    pub fn fail_watchers(&self, path: &CollectionPath, error: StoreError) {
        if let Ok(mut state) = self.lock() {
            if let Some(senders) = state.watchers.remove(path) {
                for sender in senders {
                    let _ = sender.send(Err(error.clone()));
                }
            }
        }
    }

    /// Drop every watch on `path` without sending an error.
    pub fn end_watchers(&self, path: &CollectionPath) {
        if let Ok(mut state) = self.lock() {
            state.watchers.remove(path);
        }
    }
}

impl RemoteStore for MemoryStore {
    async fn create(
        &self,
        path: &CollectionPath,
        id: &DocumentId,
        write: &DocumentWrite,
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.begin(StoreOp::Create)?;

        let mut fields = write.fields.clone();
        if !write.server_timestamps.is_empty() {
            let stamp = state.next_timestamp();
            for field in &write.server_timestamps {
                fields.insert(field.clone(), Value::from(stamp));
            }
        }
        state
            .collections
            .entry(path.clone())
            .or_default()
            .insert(id.clone(), fields);
        state.broadcast(path);
        Ok(())
    }

    async fn merge(
        &self,
        path: &CollectionPath,
        id: &DocumentId,
        fields: &Map<String, Value>,
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.begin(StoreOp::Merge)?;

        let existing = state
            .collections
            .get_mut(path)
            .and_then(|collection| collection.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(format!("{path}/{id}")))?;
        for (key, value) in fields {
            existing.insert(key.clone(), value.clone());
        }
        state.broadcast(path);
        Ok(())
    }

    async fn delete(&self, path: &CollectionPath, id: &DocumentId) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.begin(StoreOp::Delete)?;

        let removed = state
            .collections
            .get_mut(path)
            .and_then(|collection| collection.remove(id));
        if removed.is_some() {
            state.broadcast(path);
        }
        Ok(())
    }

    async fn watch(&self, path: &CollectionPath) -> StoreResult<Subscription> {
        let mut state = self.lock()?;
        state.begin(StoreOp::Watch)?;

        let (sender, subscription) = Subscription::channel(path.clone());
        let _ = sender.send(Ok(state.snapshot(path)));

        let senders = state.watchers.entry(path.clone()).or_default();
        senders.retain(|existing| !existing.is_closed());
        senders.push(sender);
        Ok(subscription)
    }
}
