//! Data models for the journal

mod entry;

pub use entry::{
    normalize_tags, split_tags, DocumentId, EntryDraft, EntryKind, JournalEntry, SaveMode,
    FIELD_CONTENT, FIELD_CREATED_AT, FIELD_TAGS, FIELD_TITLE, FIELD_TYPE,
};
