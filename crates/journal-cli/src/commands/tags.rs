use crate::commands::common::open_journal;
use crate::error::CliError;

pub async fn run_tags(as_json: bool) -> Result<(), CliError> {
    let mut controller = open_journal().await?;
    let tags = controller.tags().to_vec();
    controller.shutdown();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else {
        for tag in tags {
            println!("#{tag}");
        }
    }
    Ok(())
}
