//! Derived views over the entry list: filtering, search, and tag aggregation.
//!
//! Everything here is a pure function of its inputs.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::str::FromStr;

use crate::models::{split_tags, EntryKind, JournalEntry};

const ALL: &str = "All";

/// Entry type selection; `All` passes every entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    All,
    Only(EntryKind),
}

impl FromStr for TypeFilter {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(ALL) {
            Ok(Self::All)
        } else {
            Ok(Self::Only(EntryKind::from(s)))
        }
    }
}

/// Tag selection; `All` passes every entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagFilter {
    #[default]
    All,
    Only(String),
}

impl FromStr for TagFilter {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(ALL) {
            Ok(Self::All)
        } else {
            Ok(Self::Only(s.to_lowercase()))
        }
    }
}

/// Filter criteria bound to the list controls.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryFilter {
    pub entry_type: TypeFilter,
    pub tag: TagFilter,
    pub search: String,
}

impl EntryFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_type(mut self, entry_type: TypeFilter) -> Self {
        self.entry_type = entry_type;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: TagFilter) -> Self {
        self.tag = tag;
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }
}

/// Entries passing the type and tag filters and, when a search term is given,
/// matching it; newest first.
#[must_use]
pub fn filter_entries(entries: &[JournalEntry], filter: &EntryFilter) -> Vec<JournalEntry> {
    let search = normalize_query(&filter.search);

    let mut visible: Vec<JournalEntry> = entries
        .iter()
        .filter(|entry| matches_type(entry, &filter.entry_type))
        .filter(|entry| matches_tag(entry, &filter.tag))
        .filter(|entry| matches_search(entry, &search))
        .cloned()
        .collect();
    sort_newest_first(&mut visible);
    visible
}

/// Sorted, deduplicated tag labels across all entries.
#[must_use]
pub fn collect_tags(entries: &[JournalEntry]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| split_tags(&entry.tags))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Stable sort by `created_at`, descending.
pub fn sort_newest_first(entries: &mut [JournalEntry]) {
    entries.sort_by(|left, right| right.created_at.cmp(&left.created_at));
}

fn normalize_query(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn matches_type(entry: &JournalEntry, filter: &TypeFilter) -> bool {
    match filter {
        TypeFilter::All => true,
        TypeFilter::Only(kind) => &entry.kind == kind,
    }
}

fn matches_tag(entry: &JournalEntry, filter: &TagFilter) -> bool {
    match filter {
        TagFilter::All => true,
        TagFilter::Only(tag) => {
            let wanted = normalize_query(tag);
            entry.tag_list().iter().any(|candidate| *candidate == wanted)
        }
    }
}

fn matches_search(entry: &JournalEntry, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    entry.title.to_lowercase().contains(query)
        || entry.content.to_lowercase().contains(query)
        || entry.tags.to_lowercase().contains(query)
}
