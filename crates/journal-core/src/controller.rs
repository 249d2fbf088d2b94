//! Journal state controller.
//!
//! Bridges sign-in, the live subscription on the signed-in user's entry
//! collection, and the add/edit/delete actions. The entry list is only ever
//! replaced by subscription deliveries; actions never patch it locally.

use crate::auth::{Identity, IdentityProvider};
use crate::error::{Error, Result};
use crate::filters::{collect_tags, filter_entries, sort_newest_first, EntryFilter};
use crate::models::{DocumentId, EntryDraft, JournalEntry, SaveMode, FIELD_CREATED_AT};
use crate::retry::{run_with_retry, RetryFailure, RetryPolicy, WriteOp};
use crate::state::{JournalState, Modal, StatusMessage};
use crate::store::{
    CollectionPath, DocumentWrite, RemoteStore, Snapshot, StoreError, Subscription,
};
use crate::util::unix_millis_now;

pub const DEFAULT_NAMESPACE: &str = "artifacts";

/// Collection addressing and write policy for one controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub app_id: String,
    pub namespace: String,
    /// Sign in with this token instead of anonymously
    pub initial_auth_token: Option<String>,
    pub retry: RetryPolicy,
}

impl ControllerSettings {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            initial_auth_token: None,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct JournalController<S: RemoteStore, I: IdentityProvider> {
    store: S,
    identity_provider: I,
    settings: ControllerSettings,
    state: JournalState,
    subscription: Option<Subscription>,
}

impl<S: RemoteStore, I: IdentityProvider> JournalController<S, I> {
    pub fn new(store: S, identity_provider: I, settings: ControllerSettings) -> Self {
        Self {
            store,
            identity_provider,
            settings,
            state: JournalState::new(),
            subscription: None,
        }
    }

    pub const fn state(&self) -> &JournalState {
        &self.state
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.state.entries
    }

    pub fn tags(&self) -> &[String] {
        &self.state.tags
    }

    /// Entries for the current filter controls.
    pub fn visible_entries(&self, filter: &EntryFilter) -> Vec<JournalEntry> {
        filter_entries(&self.state.entries, filter)
    }

    pub const fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Establish identity and open the entry subscription.
    ///
    /// Failures are recorded in state and the controller is still marked
    /// ready, so callers never wait on a session that cannot start.
    pub async fn initialize(&mut self) -> Result<Identity> {
        if self.settings.app_id.trim().is_empty() {
            let error = Error::Configuration("app id is not set".to_string());
            return Err(self.fail_startup(error));
        }

        let identity = match self.establish_identity().await {
            Ok(identity) => identity,
            Err(error) => return Err(self.fail_startup(error)),
        };

        tracing::info!("Signed in as {}", identity);
        self.state.ready = true;
        self.subscribe(identity.clone()).await?;
        Ok(identity)
    }

    async fn establish_identity(&self) -> Result<Identity> {
        match self.identity_provider.restore().await {
            Ok(Some(identity)) => return Ok(identity),
            Ok(None) => {}
            Err(error) => tracing::warn!("Ignoring unusable stored session: {}", error),
        }

        let signed_in = match self.settings.initial_auth_token.as_deref() {
            Some(token) => self.identity_provider.sign_in_with_token(token).await,
            None => self.identity_provider.sign_in_anonymously().await,
        };
        signed_in.map_err(|error| Error::Authentication(error.to_string()))
    }

    fn fail_startup(&mut self, error: Error) -> Error {
        tracing::error!("Journal startup failed: {}", error);
        self.state.ready = true;
        self.state.loading = false;
        self.state.error = Some(error.clone());
        error
    }

    /// Open the live subscription for `identity`, closing any previous one
    /// first. Subscription failures are not retried here.
    pub async fn subscribe(&mut self, identity: Identity) -> Result<()> {
        self.close_subscription();

        if self.state.identity.as_ref() != Some(&identity) {
            self.state.entries.clear();
            self.state.tags.clear();
        }
        let path = match self.collection_path_for(&identity) {
            Ok(path) => path,
            Err(error) => return Err(self.fail_startup(error)),
        };
        self.state.identity = Some(identity);
        self.state.loading = true;
        self.state.error = None;

        match self.store.watch(&path).await {
            Ok(subscription) => {
                tracing::info!("Subscribed to {}", path);
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(error) => Err(self.fail_subscription(&error)),
        }
    }

    fn close_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            tracing::debug!("Closing subscription on {}", subscription.path());
            subscription.close();
        }
    }

    fn fail_subscription(&mut self, error: &StoreError) -> Error {
        self.close_subscription();
        let error = Error::Subscription(error.to_string());
        tracing::error!("{}", error);
        self.state.error = Some(error.clone());
        self.state.loading = false;
        error
    }

    /// Wait for the next delivery and apply it. Returns `false` when there is
    /// no open subscription or the store ended it.
    pub async fn next_delivery(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return false;
        };
        match subscription.next().await {
            Some(snapshot) => {
                self.apply_snapshot(snapshot);
                true
            }
            None => {
                self.fail_subscription(&StoreError::watch_ended());
                false
            }
        }
    }

    /// Apply every delivery already queued, without waiting.
    pub fn apply_ready_deliveries(&mut self) -> usize {
        let mut applied = 0;
        while let Some(snapshot) = self
            .subscription
            .as_mut()
            .and_then(Subscription::try_next)
        {
            self.apply_snapshot(snapshot);
            applied += 1;
        }
        applied
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot) {
        match snapshot {
            Ok(documents) => {
                let now_ms = unix_millis_now();
                let mut entries: Vec<JournalEntry> = documents
                    .iter()
                    .map(|document| JournalEntry::from_document(document, now_ms))
                    .collect();
                sort_newest_first(&mut entries);

                tracing::debug!("Delivery with {} entries", entries.len());
                self.state.tags = collect_tags(&entries);
                self.state.entries = entries;
                self.state.loading = false;
            }
            Err(error) => {
                self.fail_subscription(&error);
            }
        }
    }

    /// Add a new entry or merge-update an existing one.
    ///
    /// Input is validated before any request is made. On success the entry
    /// form closes; after exhausted retries it stays open for correction.
    pub async fn save(
        &mut self,
        draft: EntryDraft,
        mode: SaveMode,
        id: Option<DocumentId>,
    ) -> Result<DocumentId> {
        let (operation, id, write) = match Self::prepare_save(&draft, mode, id) {
            Ok(prepared) => prepared,
            Err(error) => return Err(self.fail_action(error)),
        };
        let path = match self.current_collection_path() {
            Ok(path) => path,
            Err(error) => return Err(self.fail_action(error)),
        };

        let store = &self.store;
        let result = match &write {
            PreparedWrite::Create(write) => {
                run_with_retry(&self.settings.retry, operation, |_| {
                    store.create(&path, &id, write)
                })
                .await
            }
            PreparedWrite::Merge(fields) => {
                run_with_retry(&self.settings.retry, operation, |_| {
                    store.merge(&path, &id, fields)
                })
                .await
            }
        };

        match result {
            Ok(()) => {
                self.state.modal = None;
                let text = match operation {
                    WriteOp::Add => "Entry added.",
                    _ => "Entry updated.",
                };
                self.state.message = Some(StatusMessage::success(text));
                Ok(id)
            }
            Err(failure) => Err(self.fail_write(failure)),
        }
    }

    fn prepare_save(
        draft: &EntryDraft,
        mode: SaveMode,
        id: Option<DocumentId>,
    ) -> Result<(WriteOp, DocumentId, PreparedWrite)> {
        match mode {
            SaveMode::Add => {
                let write = DocumentWrite::new(draft.to_create_fields()?)
                    .with_server_timestamp(FIELD_CREATED_AT);
                Ok((WriteOp::Add, DocumentId::generate(), PreparedWrite::Create(write)))
            }
            SaveMode::Edit => {
                let id = id.ok_or_else(|| {
                    Error::Validation("InvalidArgument: edit requires an entry id".to_string())
                })?;
                let fields = draft.to_merge_fields()?;
                Ok((WriteOp::Edit, id, PreparedWrite::Merge(fields)))
            }
        }
    }

    /// Ask for confirmation before deleting `id`. Nothing is sent until
    /// [`confirm_remove`](Self::confirm_remove).
    pub fn remove(&mut self, id: DocumentId) {
        tracing::debug!("Delete of {} awaiting confirmation", id);
        self.state.pending_delete = Some(id);
    }

    /// Abort a pending delete, returning the id it targeted.
    pub fn cancel_remove(&mut self) -> Option<DocumentId> {
        self.state.pending_delete.take()
    }

    /// Send the pending delete. The entry stays in the list until the next
    /// delivery reflects the deletion.
    pub async fn confirm_remove(&mut self) -> Result<DocumentId> {
        let Some(id) = self.state.pending_delete.take() else {
            let error = Error::Validation("No delete is awaiting confirmation".to_string());
            return Err(self.fail_action(error));
        };
        let path = match self.current_collection_path() {
            Ok(path) => path,
            Err(error) => return Err(self.fail_action(error)),
        };

        let store = &self.store;
        let result = run_with_retry(&self.settings.retry, WriteOp::Delete, |_| {
            store.delete(&path, &id)
        })
        .await;

        match result {
            Ok(()) => {
                self.state.message = Some(StatusMessage::success("Entry deleted."));
                Ok(id)
            }
            Err(failure) => Err(self.fail_write(failure)),
        }
    }

    pub fn dismiss_message(&mut self) {
        self.state.message = None;
    }

    pub fn open_add(&mut self) {
        self.state.modal = Some(Modal::Add);
    }

    /// Open the edit form for an entry in the current list.
    pub fn open_edit(&mut self, id: &DocumentId) -> Result<()> {
        let Some(entry) = self.state.entries.iter().find(|entry| &entry.id == id) else {
            let error = Error::Validation(format!("No entry with id {id}"));
            return Err(self.fail_action(error));
        };
        self.state.modal = Some(Modal::Edit(entry.clone()));
        Ok(())
    }

    pub fn close_modal(&mut self) {
        self.state.modal = None;
    }

    /// Tear down identity-bound state (unmount).
    pub fn shutdown(&mut self) {
        self.close_subscription();
        let ready = self.state.ready;
        self.state = JournalState::new();
        self.state.ready = ready;
        self.state.loading = false;
    }

    /// Shut down and drop the provider's session.
    pub async fn sign_out(&mut self) -> Result<()> {
        self.shutdown();
        self.identity_provider
            .sign_out()
            .await
            .map_err(|error| Error::Authentication(error.to_string()))
    }

    fn collection_path_for(&self, identity: &Identity) -> Result<CollectionPath> {
        CollectionPath::journal_entries(&self.settings.namespace, &self.settings.app_id, identity)
    }

    fn current_collection_path(&self) -> Result<CollectionPath> {
        let identity = self
            .state
            .identity
            .as_ref()
            .ok_or_else(|| Error::Authentication("Not signed in".to_string()))?;
        self.collection_path_for(identity)
    }

    fn fail_action(&mut self, error: Error) -> Error {
        tracing::warn!("{}", error);
        self.state.message = Some(StatusMessage::failure(error.to_string()));
        error
    }

    fn fail_write(&mut self, failure: RetryFailure<StoreError>) -> Error {
        let error = Error::Write {
            operation: failure.operation,
            attempts: failure.attempts,
            cause: failure.last_error.to_string(),
        };
        self.state.message = Some(StatusMessage::failure(error.to_string()));
        error
    }
}

enum PreparedWrite {
    Create(DocumentWrite),
    Merge(serde_json::Map<String, serde_json::Value>),
}
