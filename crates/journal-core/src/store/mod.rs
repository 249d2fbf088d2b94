//! Remote document store contract.
//!
//! The journal treats its backing database as an opaque service: documents
//! live in hierarchical collections, writes are whole requests, and a watch
//! pushes the full result set of a collection on every change. Adapters:
//!
//! - [`MemoryStore`]: in-process store with live watchers and fault injection
//! - [`FirestoreStore`]: Firestore REST adapter

mod firestore;
mod memory;

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::auth::Identity;
use crate::error::{Error, Result};
use crate::models::DocumentId;

pub use firestore::{FirestoreStore, TokenSource};
pub use memory::{MemoryStore, StoreOp};

const JOURNAL_COLLECTION: &str = "journal_entries";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Http(String),
    #[error("Store API error: {0}")]
    Api(String),
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Invalid document payload: {0}")]
    InvalidDocument(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),
}

impl StoreError {
    /// The store dropped a watch without reporting why.
    #[must_use]
    pub fn watch_ended() -> Self {
        Self::Unavailable("watch was closed by the store".to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Slash-separated collection address, e.g.
/// `artifacts/<app-id>/users/<identity>/journal_entries`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Private entry collection for one identity.
    pub fn journal_entries(namespace: &str, app_id: &str, identity: &Identity) -> Result<Self> {
        let segments = [
            namespace,
            app_id,
            "users",
            identity.as_str(),
            JOURNAL_COLLECTION,
        ];
        for segment in segments {
            if segment.trim().is_empty() || segment.contains('/') {
                return Err(Error::Configuration(format!(
                    "invalid collection path segment '{segment}'"
                )));
            }
        }
        Ok(Self(segments.join("/")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One document in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Map<String, Value>,
}

/// Fields for a create, plus the fields the store must stamp with its own
/// clock at commit time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentWrite {
    pub fields: Map<String, Value>,
    pub server_timestamps: Vec<String>,
}

impl DocumentWrite {
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            server_timestamps: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.server_timestamps.push(field.into());
        self
    }
}

/// A full result set, or the error that ended the watch.
pub type Snapshot = StoreResult<Vec<Document>>;

pub(crate) type SnapshotSender = mpsc::UnboundedSender<Snapshot>;

/// Handle to a live watch. Dropping or closing it stops deliveries.
#[derive(Debug)]
pub struct Subscription {
    path: CollectionPath,
    receiver: mpsc::UnboundedReceiver<Snapshot>,
}

impl Subscription {
    pub(crate) fn channel(path: CollectionPath) -> (SnapshotSender, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { path, receiver })
    }

    #[must_use]
    pub const fn path(&self) -> &CollectionPath {
        &self.path
    }

    /// Wait for the next delivery. `None` once the store ends the watch.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    /// Take an already-queued delivery without waiting. `None` means nothing
    /// is queued; a watch the store ended silently yields an error.
    pub fn try_next(&mut self) -> Option<Snapshot> {
        match self.receiver.try_recv() {
            Ok(snapshot) => Some(snapshot),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(StoreError::watch_ended())),
        }
    }

    /// Unsubscribe.
    pub fn close(mut self) {
        self.receiver.close();
    }
}

/// Operations the journal needs from a document store.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Write a new document at `id`, replacing any document already there.
    async fn create(
        &self,
        path: &CollectionPath,
        id: &DocumentId,
        write: &DocumentWrite,
    ) -> StoreResult<()>;

    /// Update only the given fields of an existing document.
    async fn merge(
        &self,
        path: &CollectionPath,
        id: &DocumentId,
        fields: &Map<String, Value>,
    ) -> StoreResult<()>;

    /// Hard-delete a document. Deleting a missing document succeeds.
    async fn delete(&self, path: &CollectionPath, id: &DocumentId) -> StoreResult<()>;

    /// Open a live watch on a collection.
    async fn watch(&self, path: &CollectionPath) -> StoreResult<Subscription>;
}
