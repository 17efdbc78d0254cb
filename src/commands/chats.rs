use super::Session;
use crate::directory::ChatSummary;
use crate::error::Result;
use colored::Colorize;
use prettytable::{format, Table};

const TITLE_WIDTH: usize = 40;

/// List the chat directory
pub async fn list_chats(session: &Session, all: bool, json: bool) -> Result<()> {
    let handle = session.directory().await?;
    let chats = visible_chats(handle.chats(), all);

    if json {
        println!("{}", serde_json::to_string_pretty(&chats)?);
        return Ok(());
    }

    if chats.is_empty() {
        println!("{}", "No chats found.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Flags".bold(),
        "Last Activity".bold()
    ]);

    for chat in &chats {
        let title = truncate(&chat.title, TITLE_WIDTH);
        let title = if chat.pinned {
            title.green().bold()
        } else {
            title.normal()
        };
        table.add_row(prettytable::row![
            chat.id.cyan(),
            title,
            flags(chat),
            chat.activity_at().format("%Y-%m-%d %H:%M").to_string()
        ]);
    }

    println!("\nChats:");
    table.printstd();
    println!();
    Ok(())
}

/// Drops archived chats unless `all` is set
pub fn visible_chats(chats: Vec<ChatSummary>, all: bool) -> Vec<ChatSummary> {
    chats
        .into_iter()
        .filter(|chat| all || !chat.archived)
        .collect()
}

fn flags(chat: &ChatSummary) -> String {
    let mut flags = Vec::new();
    if chat.pinned {
        flags.push("pinned");
    }
    if chat.archived {
        flags.push("archived");
    }
    flags.join(",")
}

/// Shortens `text` to at most `max` characters
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
