//! Read model exposed to presentation code.

use crate::auth::Identity;
use crate::error::Error;
use crate::models::{DocumentId, JournalEntry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Success,
    Failure,
}

/// Dismissible status line shown after an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Success,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Failure,
            text: text.into(),
        }
    }

    pub const fn is_failure(&self) -> bool {
        matches!(self.kind, MessageKind::Failure)
    }
}

/// Entry form currently open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Modal {
    Add,
    Edit(JournalEntry),
}

/// Everything the presentation layer renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalState {
    /// Identity resolution finished, successfully or not
    pub ready: bool,
    /// Waiting for the first delivery of the current subscription
    pub loading: bool,
    pub identity: Option<Identity>,
    /// Mirror of the last delivery, newest first
    pub entries: Vec<JournalEntry>,
    pub tags: Vec<String>,
    pub error: Option<Error>,
    pub message: Option<StatusMessage>,
    pub modal: Option<Modal>,
    /// Delete requested and awaiting confirm/cancel
    pub pending_delete: Option<DocumentId>,
}

impl JournalState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ready: false,
            loading: true,
            identity: None,
            entries: Vec::new(),
            tags: Vec::new(),
            error: None,
            message: None,
            modal: None,
            pending_delete: None,
        }
    }
}

impl Default for JournalState {
    fn default() -> Self {
        Self::new()
    }
}
