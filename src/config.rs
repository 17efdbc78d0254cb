//! Configuration management for pqsync
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::directory::{TitlePolicy, DEFAULT_TITLE, MAX_TITLE_WORDS};
use crate::error::{Result, SyncError};
use crate::sync::DECRYPTION_PLACEHOLDER;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for pqsync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Decryption and title rules
    #[serde(default)]
    pub sync: SyncConfig,
    /// Locations of the snapshot and key files
    #[serde(default)]
    pub storage: StorageConfig,
    /// Log output format
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Content shown for messages that fail to decrypt
    #[serde(default = "default_decryption_placeholder")]
    pub decryption_placeholder: String,

    /// Title used when a chat has no usable title
    #[serde(default = "default_title")]
    pub default_title: String,

    /// Maximum words kept in a chat title
    #[serde(default = "default_title_max_words")]
    pub title_max_words: usize,
}

fn default_decryption_placeholder() -> String {
    DECRYPTION_PLACEHOLDER.to_string()
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_title_max_words() -> usize {
    MAX_TITLE_WORDS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            decryption_placeholder: default_decryption_placeholder(),
            default_title: default_title(),
            title_max_words: default_title_max_words(),
        }
    }
}

impl SyncConfig {
    /// Title rules derived from this configuration
    pub fn title_policy(&self) -> TitlePolicy {
        TitlePolicy {
            default_title: self.default_title.clone(),
            max_words: self.title_max_words,
        }
    }
}

/// File locations used by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON snapshot of chats and messages
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// JSON file with the user's base64 keypair
    #[serde(default = "default_keys_path")]
    pub keys_path: PathBuf,
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("com", "pqsync", "pqsync")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_snapshot_path() -> PathBuf {
    data_dir().join("snapshot.json")
}

fn default_keys_path() -> PathBuf {
    data_dir().join("keys.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            keys_path: default_keys_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| SyncError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(snapshot) = std::env::var("PQSYNC_SNAPSHOT") {
            self.storage.snapshot_path = PathBuf::from(snapshot);
        }

        if let Ok(keys) = std::env::var("PQSYNC_KEYS") {
            self.storage.keys_path = PathBuf::from(keys);
        }

        if let Ok(placeholder) = std::env::var("PQSYNC_PLACEHOLDER") {
            self.sync.decryption_placeholder = placeholder;
        }

        if let Ok(json) = std::env::var("PQSYNC_JSON_LOGS") {
            match json.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.logging.json = true,
                "0" | "false" | "no" => self.logging.json = false,
                other => tracing::warn!("Ignoring invalid PQSYNC_JSON_LOGS value: {}", other),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(snapshot) = &cli.snapshot {
            self.storage.snapshot_path = snapshot.clone();
        }
        if let Some(keys) = &cli.keys {
            self.storage.keys_path = keys.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.sync.decryption_placeholder.trim().is_empty() {
            return Err(SyncError::Config(
                "sync.decryption_placeholder cannot be empty".to_string(),
            )
            .into());
        }

        if self.sync.default_title.trim().is_empty() {
            return Err(
                SyncError::Config("sync.default_title cannot be empty".to_string()).into(),
            );
        }

        if self.sync.title_max_words == 0 {
            return Err(SyncError::Config(
                "sync.title_max_words must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
