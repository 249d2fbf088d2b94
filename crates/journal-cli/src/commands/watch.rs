use crate::commands::common::{format_entry_lines, open_journal, wait_for_delivery};
use crate::error::CliError;

/// Print the full list on every delivery until Ctrl-C.
pub async fn run_watch() -> Result<(), CliError> {
    let mut controller = open_journal().await?;
    print_snapshot(controller.entries().len(), &format_entry_lines(controller.entries()));

    loop {
        tokio::select! {
            delivered = wait_for_delivery(&mut controller) => {
                delivered?;
                print_snapshot(controller.entries().len(), &format_entry_lines(controller.entries()));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping watch");
                break;
            }
        }
    }

    controller.shutdown();
    Ok(())
}

fn print_snapshot(count: usize, lines: &[String]) {
    println!("--- {count} entr{} ---", if count == 1 { "y" } else { "ies" });
    for line in lines {
        println!("{line}");
    }
}
