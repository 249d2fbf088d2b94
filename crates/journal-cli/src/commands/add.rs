use journal_core::SaveMode;

use crate::commands::common::{draft_from_args, open_journal};
use crate::error::CliError;

pub async fn run_add(
    title: String,
    content: Option<String>,
    entry_type: Option<String>,
    tags: Option<String>,
) -> Result<(), CliError> {
    let draft = draft_from_args(Some(title), content, entry_type, tags);
    // Reject bad input before signing in.
    draft.to_create_fields()?;

    let mut controller = open_journal().await?;
    let id = controller.save(draft, SaveMode::Add, None).await?;
    controller.shutdown();

    println!("{id}");
    Ok(())
}
