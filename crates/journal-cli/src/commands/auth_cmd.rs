use journal_core::auth::SessionPersistence;
use journal_core::FirebaseConfig;

use crate::auth::KeychainSessions;
use crate::cli::AuthCommands;
use crate::commands::common::format_timestamp;
use crate::error::CliError;

pub fn run_auth(command: &AuthCommands) -> Result<(), CliError> {
    let project_id = FirebaseConfig::from_env()?.project_id;
    let sessions = KeychainSessions::new(&project_id);

    match command {
        AuthCommands::Status => {
            let session = sessions
                .load_session()
                .map_err(|error| CliError::Auth(error.to_string()))?;
            if let Some(session) = session {
                let state = if session.is_expired() { "expired" } else { "valid" };
                println!(
                    "Project '{}' is signed in as {} ({} until {})",
                    project_id,
                    session.user_id,
                    state,
                    format_timestamp(session.expires_at.saturating_mul(1_000))
                );
            } else {
                println!("Project '{project_id}' is not signed in.");
            }
        }
        AuthCommands::Logout => {
            sessions
                .clear_session()
                .map_err(|error| CliError::Auth(error.to_string()))?;
            println!("Signed out of project '{project_id}'");
        }
    }
    Ok(())
}
