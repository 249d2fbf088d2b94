//! journal-core - Core library for the Spiritual Journal
//!
//! Entry models, the remote store and identity provider contracts with their
//! Firebase adapters, and the controller that keeps a live mirror of the
//! signed-in user's journal.

pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod filters;
pub mod models;
pub mod retry;
pub mod state;
pub mod store;
pub mod util;

pub use auth::{FirebaseAuthClient, Identity, IdentityProvider};
pub use config::{FirebaseConfig, JournalConfig};
pub use controller::{ControllerSettings, JournalController};
pub use error::{Error, Result};
pub use filters::EntryFilter;
pub use models::{DocumentId, EntryDraft, EntryKind, JournalEntry, SaveMode};
pub use state::JournalState;
pub use store::{FirestoreStore, MemoryStore, RemoteStore};
