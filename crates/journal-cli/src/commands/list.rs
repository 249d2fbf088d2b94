use journal_core::filters::{TagFilter, TypeFilter};
use journal_core::EntryFilter;

use crate::commands::common::{
    entry_to_list_item, format_entry_lines, open_journal, EntryListItem,
};
use crate::error::CliError;

pub struct ListOptions {
    pub entry_type: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub json: bool,
}

impl ListOptions {
    pub fn filter(&self) -> EntryFilter {
        let entry_type = self
            .entry_type
            .as_deref()
            .map_or(TypeFilter::All, |raw| raw.parse().unwrap_or_default());
        let tag = self
            .tag
            .as_deref()
            .map_or(TagFilter::All, |raw| raw.parse().unwrap_or_default());

        EntryFilter::new()
            .with_type(entry_type)
            .with_tag(tag)
            .with_search(self.search.clone().unwrap_or_default())
    }
}

pub async fn run_list(options: ListOptions) -> Result<(), CliError> {
    let mut controller = open_journal().await?;
    let mut entries = controller.visible_entries(&options.filter());
    if let Some(limit) = options.limit {
        entries.truncate(limit);
    }
    controller.shutdown();

    if options.json {
        let json_items = entries
            .iter()
            .map(entry_to_list_item)
            .collect::<Vec<EntryListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if entries.is_empty() {
        println!("No entries yet.");
    } else {
        for line in format_entry_lines(&entries) {
            println!("{line}");
        }
    }

    Ok(())
}
