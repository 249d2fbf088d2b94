//! Journal CLI - read and write a live-synced spiritual journal from the terminal

mod auth;
mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::filter::Directive;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::{run_list, ListOptions};
use crate::commands::tags::run_tags;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive: Directive = "journal=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List {
            entry_type,
            tag,
            search,
            limit,
            json,
        } => {
            run_list(ListOptions {
                entry_type,
                tag,
                search,
                limit,
                json,
            })
            .await?;
        }
        Commands::Tags { json } => run_tags(json).await?,
        Commands::Add {
            title,
            content,
            entry_type,
            tags,
        } => run_add(title, content, entry_type, tags).await?,
        Commands::Edit {
            id,
            title,
            content,
            entry_type,
            tags,
        } => run_edit(&id, title, content, entry_type, tags).await?,
        Commands::Delete { id, yes } => run_delete(&id, yes).await?,
        Commands::Watch => run_watch().await?,
        Commands::Auth { command } => run_auth(&command)?,
    }

    Ok(())
}
