use super::Session;
use crate::error::{Result, SyncError};
use crate::lineage::BranchSlot;
use crate::messages::Role;
use colored::Colorize;

/// Print the active branch of a conversation
pub async fn show_history(session: &Session, chat_id: &str, leaf: Option<&str>, json: bool) -> Result<()> {
    let history = session.conversations().decrypt_history(chat_id).await?;

    let branch = match leaf {
        Some(leaf_id) => {
            if !history.messages.iter().any(|m| m.id == leaf_id) {
                return Err(SyncError::Config(format!("Message {} is not part of chat {}", leaf_id, chat_id)).into());
            }
            history.branch_for_leaf(leaf_id)
        }
        None => history.branch.clone(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&branch)?);
        return Ok(());
    }

    if branch.is_empty() {
        println!("{}", "No messages in this chat.".yellow());
        return Ok(());
    }

    println!();
    for slot in &branch.slots {
        println!("{}", slot_header(slot));
        let message = &slot.message;
        if let Some(reasoning) = &message.reasoning {
            println!("  {}", format!("[reasoning] {}", first_line(reasoning)).dimmed());
        }
        let body = if message.decryption_failed {
            message.content.red().to_string()
        } else {
            message.content.clone()
        };
        for line in body.lines() {
            println!("  {}", line);
        }
        println!();
    }

    let failed = history.failed_count();
    if failed > 0 {
        println!("{}", format!("{} message(s) could not be decrypted.", failed).yellow());
    }
    Ok(())
}

/// Header line for one slot: id, role, model and version marker
pub fn slot_header(slot: &BranchSlot) -> String {
    let message = &slot.message;
    let role = match message.role {
        Role::User => "user".cyan(),
        Role::Assistant => "assistant".green(),
        Role::System => "system".magenta(),
    };

    let mut header = format!("{} {}", role.bold(), message.id.dimmed());
    if let Some(model) = &message.model {
        header.push_str(&format!(" [{}]", model));
    }
    if let Some(marker) = version_marker(slot) {
        header.push(' ');
        header.push_str(&marker);
    }
    header
}

/// `(v2/3)` style marker for regenerated slots
pub fn version_marker(slot: &BranchSlot) -> Option<String> {
    slot.has_versions()
        .then(|| format!("(v{}/{})", slot.current_version_index + 1, slot.versions.len()))
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
