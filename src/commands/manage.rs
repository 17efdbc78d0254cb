use super::Session;
use crate::directory::MutationOutcome;
use crate::error::{Result, SyncError};
use colored::Colorize;

/// Rename a chat; the title is sanitized and encrypted for the current user
pub async fn rename(session: &Session, chat_id: &str, title: &str) -> Result<()> {
    let handle = session.directory().await?;
    handle.rename(chat_id, title).await?;

    let renamed = handle
        .directory()
        .get(chat_id)
        .map(|chat| chat.title)
        .unwrap_or_default();
    println!("{}", format!("Renamed {} to \"{}\"", chat_id, renamed).green());
    Ok(())
}

/// Pin or unpin a chat
pub async fn pin(session: &Session, chat_id: &str, pinned: bool) -> Result<()> {
    let handle = session.directory().await?;
    let outcome = handle.pin(chat_id, pinned).await?;
    let action = if pinned { "Pinned" } else { "Unpinned" };
    report(action, chat_id, outcome)
}

/// Archive or restore a chat
pub async fn archive(session: &Session, chat_id: &str, archived: bool) -> Result<()> {
    let handle = session.directory().await?;
    let outcome = handle.archive(chat_id, archived).await?;
    let action = if archived { "Archived" } else { "Restored" };
    report(action, chat_id, outcome)
}

/// Delete a chat
pub async fn delete(session: &Session, chat_id: &str) -> Result<()> {
    let handle = session.directory().await?;
    let outcome = handle.delete(chat_id).await?;
    report("Deleted", chat_id, outcome)
}

fn report(action: &str, chat_id: &str, outcome: MutationOutcome) -> Result<()> {
    match outcome {
        MutationOutcome::Applied => {
            println!("{}", format!("{} {}", action, chat_id).green());
            Ok(())
        }
        MutationOutcome::RolledBack => Err(SyncError::Network(format!(
            "{} {} was rejected by the backend and rolled back",
            action.to_lowercase(),
            chat_id
        ))
        .into()),
        MutationOutcome::Resynchronized => Err(SyncError::Network(format!(
            "{} {} was rejected by the backend; directory reloaded",
            action.to_lowercase(),
            chat_id
        ))
        .into()),
    }
}
