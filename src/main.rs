//! pqsync - post-quantum conversation sync CLI
//!
#![doc = "pqsync - post-quantum conversation sync CLI"]
#![doc = "Main entry point for the pqsync command-line tool."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pqsync::cli::{Cli, Commands};
use pqsync::commands::{self, Session};
use pqsync::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing once the output format is known
    init_tracing(cli.verbose, config.logging.json);

    // Validate configuration
    config.validate()?;

    let session = Session::open(config)?;

    match cli.command {
        Commands::Chats { all, json } => {
            tracing::info!("Listing chats");
            commands::chats::list_chats(&session, all, json).await?;
        }
        Commands::History {
            chat_id,
            leaf,
            json,
        } => {
            tracing::info!("Showing history for chat {}", chat_id);
            commands::history::show_history(&session, &chat_id, leaf.as_deref(), json).await?;
        }
        Commands::Rename { chat_id, title } => {
            tracing::info!("Renaming chat {}", chat_id);
            commands::manage::rename(&session, &chat_id, &title).await?;
        }
        Commands::Pin { chat_id, off } => {
            tracing::info!("Updating pin on chat {}", chat_id);
            commands::manage::pin(&session, &chat_id, !off).await?;
        }
        Commands::Archive { chat_id, off } => {
            tracing::info!("Updating archive flag on chat {}", chat_id);
            commands::manage::archive(&session, &chat_id, !off).await?;
        }
        Commands::Delete { chat_id } => {
            tracing::info!("Deleting chat {}", chat_id);
            commands::manage::delete(&session, &chat_id).await?;
        }
    }

    Ok(())
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "pqsync=debug" } else { "pqsync=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
