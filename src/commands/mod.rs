//! Command handlers for the pqsync CLI
//!
//! Each handler opens the configured snapshot and key file, wires them into
//! the sync engine and prints the result.

use crate::backend::SnapshotBackend;
use crate::config::Config;
use crate::directory::{ChatDirectory, DirectoryHandle};
use crate::error::{Result, SyncError};
use crate::keystore::StaticKeyStore;
use crate::sync::ConversationSync;
use std::sync::Arc;

pub mod chats;
pub mod history;
pub mod manage;

/// Collaborators shared by every command
pub struct Session {
    config: Config,
    backend: Arc<SnapshotBackend>,
    keys: Arc<StaticKeyStore>,
}

impl Session {
    /// Opens the snapshot and key file named by `config`
    ///
    /// A missing key file is not an error: plain-text records remain
    /// readable and encrypted ones fail with a missing-keys error.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be opened or the key file
    /// exists but is invalid
    pub fn open(config: Config) -> Result<Self> {
        let backend = SnapshotBackend::open(&config.storage.snapshot_path)?;

        let keys_path = &config.storage.keys_path;
        let keys = if keys_path.exists() {
            StaticKeyStore::from_file(keys_path)?
        } else {
            tracing::warn!("Key file {} not found; encrypted records will be unreadable", keys_path.display());
            StaticKeyStore::empty()
        };

        Ok(Self {
            config,
            backend: Arc::new(backend),
            keys: Arc::new(keys),
        })
    }

    /// Loaded configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the directory service and loads it
    ///
    /// # Errors
    ///
    /// Returns an error if the directory could not be loaded
    pub async fn directory(&self) -> Result<DirectoryHandle> {
        let directory = ChatDirectory::new(
            self.backend.clone(),
            self.keys.clone(),
            self.config.sync.title_policy(),
        );
        let handle = directory.handle();
        handle.load(false).await;

        if !directory.is_loaded() {
            return Err(SyncError::Network("Failed to load chat directory (see log for details)".to_string()).into());
        }
        Ok(handle)
    }

    /// Creates the conversation facade
    pub fn conversations(&self) -> ConversationSync {
        ConversationSync::new(self.backend.clone(), self.keys.clone())
            .with_placeholder(self.config.sync.decryption_placeholder.clone())
    }
}
