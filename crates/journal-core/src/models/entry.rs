//! Journal entry model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::Document;

pub const FIELD_TITLE: &str = "title";
pub const FIELD_CONTENT: &str = "content";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_TAGS: &str = "tags";
pub const FIELD_CREATED_AT: &str = "createdAt";

/// Opaque document identifier assigned when an entry is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wrap an existing identifier.
    ///
    /// Identifiers are single path segments, so they may not be blank or
    /// contain `/`.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(Error::Validation("Entry id cannot be empty".to_string()));
        }
        if id.contains('/') {
            return Err(Error::Validation(format!(
                "Entry id '{id}' must not contain '/'"
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh client-side reference (UUID v7, hyphen-free).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Entry category. The UI offers the three named kinds; anything else read
/// from the store is preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryKind {
    #[default]
    Prayer,
    Study,
    Goal,
    Other(String),
}

impl EntryKind {
    /// Kinds offered by the entry form.
    pub const SELECTABLE: [Self; 3] = [Self::Prayer, Self::Study, Self::Goal];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Prayer => "Prayer",
            Self::Study => "Study",
            Self::Goal => "Goal",
            Self::Other(value) => value,
        }
    }
}

impl From<String> for EntryKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Prayer" => Self::Prayer,
            "Study" => Self::Study,
            "Goal" => Self::Goal,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for EntryKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EntryKind> for String {
    fn from(value: EntryKind) -> Self {
        match value {
            EntryKind::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A journal entry as mirrored from the last subscription delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: DocumentId,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Comma-separated labels, lowercased at write time
    pub tags: String,
    /// Server creation timestamp (Unix ms)
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl JournalEntry {
    /// Build an entry from a delivered document.
    ///
    /// Missing text fields read as empty; a missing or non-numeric
    /// `createdAt` (a pending server timestamp) falls back to `now_ms`.
    #[must_use]
    pub fn from_document(document: &Document, now_ms: i64) -> Self {
        let text = |field: &str| {
            document
                .fields
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let kind = document
            .fields
            .get(FIELD_TYPE)
            .and_then(Value::as_str)
            .map(EntryKind::from)
            .unwrap_or_default();
        let created_at = document
            .fields
            .get(FIELD_CREATED_AT)
            .and_then(Value::as_i64)
            .unwrap_or(now_ms);

        Self {
            id: document.id.clone(),
            title: text(FIELD_TITLE),
            content: text(FIELD_CONTENT),
            kind,
            tags: text(FIELD_TAGS),
            created_at,
        }
    }

    /// Normalized tag labels in their written order.
    #[must_use]
    pub fn tag_list(&self) -> Vec<String> {
        split_tags(&self.tags)
    }
}

/// Split a comma-separated tag string into trimmed, lowercased, non-empty labels.
#[must_use]
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Canonical stored form of a tag string: lowercase labels joined by `", "`.
#[must_use]
pub fn normalize_tags(raw: &str) -> String {
    split_tags(raw).join(", ")
}

/// Which write a save request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Add,
    Edit,
}

/// Form data for a save request. `None` fields are left out of the write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDraft {
    pub title: Option<String>,
    pub content: Option<String>,
    pub kind: Option<EntryKind>,
    pub tags: Option<String>,
}

impl EntryDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: impl Into<EntryKind>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    /// Validate and render the fields for a new document.
    ///
    /// `createdAt` is not included; the store stamps it.
    pub fn to_create_fields(&self) -> Result<Map<String, Value>> {
        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .ok_or_else(|| Error::Validation("Entry title cannot be empty".to_string()))?;

        let mut fields = Map::new();
        fields.insert(FIELD_TITLE.to_string(), Value::from(title));
        fields.insert(
            FIELD_CONTENT.to_string(),
            Value::from(self.content.clone().unwrap_or_default()),
        );
        fields.insert(
            FIELD_TYPE.to_string(),
            Value::from(String::from(self.kind.clone().unwrap_or_default())),
        );
        fields.insert(
            FIELD_TAGS.to_string(),
            Value::from(normalize_tags(self.tags.as_deref().unwrap_or_default())),
        );
        Ok(fields)
    }

    /// Validate and render the supplied fields for a merge-update.
    pub fn to_merge_fields(&self) -> Result<Map<String, Value>> {
        let mut fields = Map::new();

        if let Some(title) = self.title.as_deref() {
            let title = title.trim();
            if title.is_empty() {
                return Err(Error::Validation("Entry title cannot be empty".to_string()));
            }
            fields.insert(FIELD_TITLE.to_string(), Value::from(title));
        }
        if let Some(content) = &self.content {
            fields.insert(FIELD_CONTENT.to_string(), Value::from(content.clone()));
        }
        if let Some(kind) = &self.kind {
            fields.insert(FIELD_TYPE.to_string(), Value::from(String::from(kind.clone())));
        }
        if let Some(tags) = &self.tags {
            fields.insert(FIELD_TAGS.to_string(), Value::from(normalize_tags(tags)));
        }

        if fields.is_empty() {
            return Err(Error::Validation(
                "Edit must change at least one field".to_string(),
            ));
        }
        Ok(fields)
    }
}
