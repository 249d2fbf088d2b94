use crate::commands::common::{
    normalize_entry_identifier, open_journal, prompt_confirmation, resolve_entry, truncate,
};
use crate::error::CliError;

pub async fn run_delete(id: &str, skip_confirmation: bool) -> Result<(), CliError> {
    let query = normalize_entry_identifier(id)?;
    let mut controller = open_journal().await?;
    let entry = resolve_entry(controller.entries(), &query)?.clone();

    controller.remove(entry.id.clone());
    let confirmed = skip_confirmation
        || prompt_confirmation(&format!(
            "Delete '{}' ({})?",
            truncate(&entry.title, 40),
            entry.id
        ))?;
    if !confirmed {
        controller.cancel_remove();
        controller.shutdown();
        println!("Cancelled.");
        return Ok(());
    }

    let deleted = controller.confirm_remove().await?;
    controller.shutdown();
    println!("{deleted}");
    Ok(())
}
