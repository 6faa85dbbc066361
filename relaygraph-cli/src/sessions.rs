use std::sync::Arc;

use clap::Subcommand;
use relaygraph::{CheckpointStore, SessionId};

use crate::error::{CliError, CliResult};

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List stored sessions, most recent first
    List,
    /// Print the stored state of a session as JSON
    Show { id: SessionId },
    /// Delete a session's checkpoint
    Delete { id: SessionId },
}

pub async fn run(store: Arc<dyn CheckpointStore>, command: SessionCommands) -> CliResult<()> {
    match command {
        SessionCommands::List => {
            let sessions = store.list().await?;
            if sessions.is_empty() {
                println!("No sessions in the {} store.", store.backend());
                return Ok(());
            }
            println!("{:<40} {:<26} {:>8}", "SESSION", "UPDATED", "MESSAGES");
            for info in sessions {
                println!(
                    "{:<40} {:<26} {:>8}",
                    info.session_id.as_str(),
                    info.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                    info.history_len
                );
            }
        }
        SessionCommands::Show { id } => {
            let state = store
                .load(&id)
                .await?
                .ok_or_else(|| CliError::SessionNotFound(id.clone()))?;
            let json = serde_json::to_string_pretty(&state)
                .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
            println!("{json}");
        }
        SessionCommands::Delete { id } => {
            if store.delete(&id).await? {
                println!("Deleted session {id}.");
            } else {
                return Err(CliError::SessionNotFound(id));
            }
        }
    }
    Ok(())
}
