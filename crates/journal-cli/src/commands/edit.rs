use journal_core::{EntryDraft, SaveMode};

use crate::commands::common::{
    draft_from_args, normalize_entry_identifier, open_journal, resolve_entry,
};
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    title: Option<String>,
    content: Option<String>,
    entry_type: Option<String>,
    tags: Option<String>,
) -> Result<(), CliError> {
    let query = normalize_entry_identifier(id)?;
    let draft = draft_from_args(title, content, entry_type, tags);
    if draft == EntryDraft::default() {
        return Err(CliError::NothingToEdit);
    }
    draft.to_merge_fields()?;

    let mut controller = open_journal().await?;
    let entry_id = resolve_entry(controller.entries(), &query)?.id.clone();
    let updated = controller.save(draft, SaveMode::Edit, Some(entry_id)).await?;
    controller.shutdown();

    println!("{updated}");
    Ok(())
}
