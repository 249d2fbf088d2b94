use clap::{Parser, Subcommand};
use journal_core::EntryKind;

#[derive(Parser)]
#[command(name = "journal")]
#[command(about = "Keep a live-synced spiritual journal from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List entries, newest first
    #[command(alias = "ls")]
    List {
        /// Only show entries of this type (Prayer, Study, Goal)
        #[arg(long = "type", value_name = "TYPE")]
        entry_type: Option<String>,
        /// Only show entries carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Case-insensitive text search over title, content, and tags
        #[arg(short, long)]
        search: Option<String>,
        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every tag in use
    Tags {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new entry
    #[command(alias = "new")]
    Add {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        content: Option<String>,
        /// Entry type: Prayer (default), Study, or Goal
        #[arg(long = "type", value_name = "TYPE", value_parser = parse_entry_type)]
        entry_type: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Update fields of an existing entry
    Edit {
        /// Entry ID or unique ID prefix
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        content: Option<String>,
        #[arg(long = "type", value_name = "TYPE", value_parser = parse_entry_type)]
        entry_type: Option<String>,
        /// Comma-separated tags, replacing the current ones
        #[arg(long)]
        tags: Option<String>,
    },
    /// Delete an entry
    #[command(alias = "rm")]
    Delete {
        /// Entry ID or unique ID prefix
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the journal on every change until interrupted
    Watch,
    /// Inspect or clear the stored sign-in session
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Show the stored session
    Status,
    /// Forget the stored session
    Logout,
}

/// Accept one of the selectable entry kinds, ignoring case.
pub fn parse_entry_type(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    EntryKind::SELECTABLE
        .iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(raw))
        .map(|kind| kind.as_str().to_string())
        .ok_or_else(|| {
            let options = EntryKind::SELECTABLE
                .iter()
                .map(EntryKind::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            format!("expected one of {options}")
        })
}
