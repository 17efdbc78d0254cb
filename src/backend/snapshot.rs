//! File-backed backend
//!
//! Serves the [`Backend`] interface from a JSON snapshot of the server's
//! records. Used by the CLI for offline inspection; updates and deletes are
//! written back to the snapshot file.

use super::{Backend, ChatUpdate, RawChat, RawMessage};
use crate::error::{Result, SyncError};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Exported chats and messages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Chat directory records
    #[serde(default)]
    pub chats: Vec<RawChat>,
    /// Messages keyed by chat id
    #[serde(default)]
    pub messages: BTreeMap<String, Vec<RawMessage>>,
}

/// Backend serving a [`Snapshot`], optionally persisted to disk
///
/// A change becomes visible in memory only after it has been written.
pub struct SnapshotBackend {
    path: Option<PathBuf>,
    snapshot: Mutex<Snapshot>,
}

impl SnapshotBackend {
    /// Creates an in-memory backend over `snapshot`
    pub fn in_memory(snapshot: Snapshot) -> Self {
        Self {
            path: None,
            snapshot: Mutex::new(snapshot),
        }
    }

    /// Opens a snapshot file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

        tracing::debug!(
            "Opened snapshot {} ({} chats)",
            path.display(),
            snapshot.chats.len()
        );

        Ok(Self {
            path: Some(path),
            snapshot: Mutex::new(snapshot),
        })
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the current snapshot
    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().await.clone()
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| SyncError::Network(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[async_trait]
impl Backend for SnapshotBackend {
    async fn get_chats(&self) -> Result<Vec<RawChat>> {
        Ok(self.snapshot.lock().await.chats.clone())
    }

    async fn update_chat(&self, id: &str, update: ChatUpdate) -> Result<()> {
        let mut current = self.snapshot.lock().await;
        let mut snapshot = current.clone();
        let chat = snapshot
            .chats
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SyncError::ChatNotFound(id.to_string()))?;

        if let Some(title) = update.title {
            chat.encrypted_title = Some(title);
            chat.iv = update.iv;
            chat.encapsulated_key = update.encapsulated_key;
        }
        if let Some(pinned) = update.pinned {
            chat.pinned = pinned;
        }
        if let Some(archived) = update.archived {
            chat.archived = archived;
        }

        self.persist(&snapshot).await?;
        *current = snapshot;
        Ok(())
    }

    async fn delete_chat(&self, id: &str) -> Result<()> {
        let mut current = self.snapshot.lock().await;
        if !current.chats.iter().any(|c| c.id == id) {
            return Err(SyncError::ChatNotFound(id.to_string()).into());
        }

        let mut snapshot = current.clone();
        snapshot.chats.retain(|c| c.id != id);
        snapshot.messages.remove(id);
        self.persist(&snapshot).await?;
        *current = snapshot;
        Ok(())
    }

    async fn get_ai_chat_messages(&self, chat_id: &str) -> Result<Vec<RawMessage>> {
        Ok(self
            .snapshot
            .lock()
            .await
            .messages
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }
}
