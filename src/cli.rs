//! Command-line interface definition for pqsync
//!
//! This module defines the CLI structure using clap's derive API. The
//! commands inspect and modify an exported snapshot of encrypted chats.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pqsync - post-quantum conversation sync
///
/// Decrypt, browse and organize end-to-end encrypted chats from a
/// snapshot of the server's records.
#[derive(Parser, Debug, Clone)]
#[command(name = "pqsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Snapshot file to read chats and messages from
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    /// JSON key file holding the user's keypair
    #[arg(long, global = true)]
    pub keys: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for pqsync
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List chats, most recent first
    Chats {
        /// Include archived chats
        #[arg(short, long)]
        all: bool,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the active branch of a conversation
    History {
        /// Chat identifier
        chat_id: String,

        /// Show the branch ending at this message instead of the newest one
        #[arg(short, long)]
        leaf: Option<String>,

        /// Output the branch as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rename a chat
    Rename {
        /// Chat identifier
        chat_id: String,

        /// New title
        title: String,
    },

    /// Pin a chat to the top of the list
    Pin {
        /// Chat identifier
        chat_id: String,

        /// Unpin instead
        #[arg(long)]
        off: bool,
    },

    /// Archive a chat
    Archive {
        /// Chat identifier
        chat_id: String,

        /// Restore from the archive instead
        #[arg(long)]
        off: bool,
    },

    /// Delete a chat and its messages
    Delete {
        /// Chat identifier
        chat_id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            snapshot: None,
            keys: None,
            command: Commands::Chats {
                all: false,
                json: false,
            },
        }
    }
}
