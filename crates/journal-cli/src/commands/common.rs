use std::io::{self, BufRead, Write};

use chrono::Utc;
use journal_core::{
    DocumentId, EntryDraft, FirestoreStore, JournalConfig, JournalController, JournalEntry,
};
use serde::Serialize;

use crate::auth::{auth_client, JournalAuthClient};
use crate::error::CliError;

pub type CliController = JournalController<FirestoreStore<JournalAuthClient>, JournalAuthClient>;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct EntryListItem {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub created_at_iso: String,
    pub relative_time: String,
}

/// Sign in, subscribe, and wait for the first delivery.
pub async fn open_journal() -> Result<CliController, CliError> {
    let config = JournalConfig::from_env()?;
    let auth = auth_client(&config.firebase.api_key, &config.firebase.project_id)
        .map_err(|error| CliError::Auth(error.to_string()))?;
    let store = FirestoreStore::new(&config.firebase.project_id, auth.clone())
        .map_err(|error| CliError::Store(error.to_string()))?
        .with_poll_interval(config.poll_interval);

    let mut controller = JournalController::new(store, auth, config.controller_settings());
    controller.initialize().await?;
    wait_for_delivery(&mut controller).await?;
    Ok(controller)
}

/// Apply the next delivery, surfacing a subscription failure as an error.
pub async fn wait_for_delivery(controller: &mut CliController) -> Result<(), CliError> {
    let delivered = controller.next_delivery().await;
    if let Some(error) = controller.state().error.clone() {
        return Err(error.into());
    }
    if delivered {
        Ok(())
    } else {
        Err(CliError::SubscriptionClosed)
    }
}

pub fn normalize_entry_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyEntryId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find an entry by exact id, then by unique id prefix.
pub fn resolve_entry<'a>(
    entries: &'a [JournalEntry],
    query: &str,
) -> Result<&'a JournalEntry, CliError> {
    let query = normalize_entry_identifier(query)?;
    if let Some(entry) = entries.iter().find(|entry| entry.id.as_str() == query) {
        return Ok(entry);
    }

    let matches: Vec<&JournalEntry> = entries
        .iter()
        .filter(|entry| entry.id.as_str().starts_with(&query))
        .collect();
    match matches.as_slice() {
        [] => Err(CliError::EntryNotFound(query)),
        [entry] => Ok(*entry),
        several => {
            let options = several
                .iter()
                .take(3)
                .map(|entry| short_id(&entry.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousEntryId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Draft holding only the fields given on the command line.
pub fn draft_from_args(
    title: Option<String>,
    content: Option<String>,
    entry_type: Option<String>,
    tags: Option<String>,
) -> EntryDraft {
    EntryDraft {
        title,
        content,
        kind: entry_type.map(|kind| kind.trim().into()),
        tags,
    }
}

pub fn short_id(id: &DocumentId) -> String {
    id.as_str().chars().take(SHORT_ID_LEN).collect()
}

pub fn format_entry_lines(entries: &[JournalEntry]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            let short_id = short_id(&entry.id);
            let title = truncate(&entry.title, 40);
            let kind = entry.kind.as_str();
            let relative_time = format_relative_time(entry.created_at, now_ms);
            let tags = render_tags(entry);

            if tags.is_empty() {
                format!("{short_id:<13}  {title:<40}  {kind:<8}  {relative_time}")
            } else {
                format!("{short_id:<13}  {title:<40}  {kind:<8}  {relative_time:<10}  {tags}")
            }
        })
        .collect()
}

pub fn entry_to_list_item(entry: &JournalEntry) -> EntryListItem {
    let now_ms = Utc::now().timestamp_millis();
    EntryListItem {
        id: entry.id.to_string(),
        title: entry.title.clone(),
        content: entry.content.clone(),
        entry_type: entry.kind.to_string(),
        tags: entry.tag_list(),
        created_at: entry.created_at,
        created_at_iso: format_timestamp(entry.created_at),
        relative_time: format_relative_time(entry.created_at, now_ms),
    }
}

pub fn render_tags(entry: &JournalEntry) -> String {
    entry
        .tag_list()
        .into_iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated = collapsed
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.to_rfc3339(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// `y`/`yes` (any case) confirms; anything else declines.
pub fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub fn prompt_confirmation(question: &str) -> Result<bool, CliError> {
    let mut stdout = io::stdout();
    write!(stdout, "{question} [y/N] ")?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_confirmation(&answer))
}
