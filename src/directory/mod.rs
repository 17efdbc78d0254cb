//! Chat directory cache
//!
//! One [`ChatDirectory`] is created per process and shared by every consumer
//! (sidebar, search palette, ...). Each consumer holds a [`DirectoryHandle`]
//! carrying its own instance id.
//!
//! - At most one directory fetch is in flight at a time: concurrent
//!   [`DirectoryHandle::load`] calls await the same shared future.
//! - Every change re-sorts the list by recency and is published
//!   synchronously to all subscribers, tagged with the originating instance.
//!   Publishes are serialized, so subscribers see changes in the order they
//!   were applied. Callbacks may read the directory but must not mutate it.
//! - Mutations are optimistic: the cache changes first, then the backend is
//!   called, and failures roll the change back (or resynchronize on delete).

use crate::backend::{Backend, ChatUpdate, RawChat};
use crate::crypto::{decapsulate_and_decrypt, encrypt_for_recipient};
use crate::error::{Result, SyncError};
use crate::keystore::{KeyStore, UserKeys};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use uuid::Uuid;

pub mod title;

pub use title::{TitlePolicy, DEFAULT_TITLE, MAX_TITLE_WORDS};

/// Identity of a directory consumer
pub type InstanceId = Uuid;

/// Decrypted chat directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Chat identifier
    pub id: String,
    /// Sanitized title
    pub title: String,
    /// Pinned flag
    pub pinned: bool,
    /// Archived flag
    pub archived: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the most recent message
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ChatSummary {
    /// Timestamp used for ordering: last message, else creation
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.created_at)
    }
}

/// Sorts chats by recency, newest first
///
/// Ties are broken by id so the order is total.
pub fn sort_by_recency(chats: &mut [ChatSummary]) {
    chats.sort_by(|a, b| {
        b.activity_at()
            .cmp(&a.activity_at())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Notification sent to subscribers on every publish
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEvent {
    /// Full sorted directory after the change
    pub chats: Vec<ChatSummary>,
    /// Consumer whose action caused the change
    pub source_instance_id: InstanceId,
}

/// How an optimistic mutation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Backend accepted the change
    Applied,
    /// Backend rejected the change; the cache was restored
    RolledBack,
    /// Backend rejected a delete; the directory was reloaded
    Resynchronized,
}

/// Drops repeated ids, keeping the last record for each at the position of
/// its first occurrence
fn dedup_by_id(raw: Vec<RawChat>) -> Vec<RawChat> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(raw.len());
    let mut unique: Vec<RawChat> = Vec::with_capacity(raw.len());
    for chat in raw {
        match positions.get(&chat.id) {
            Some(&index) => {
                tracing::warn!("Backend returned chat {} more than once; keeping the last record", chat.id);
                unique[index] = chat;
            }
            None => {
                positions.insert(chat.id.clone(), unique.len());
                unique.push(chat);
            }
        }
    }
    unique
}

/// Boolean chat attributes toggled by optimistic mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatFlag {
    Pinned,
    Archived,
}

impl ChatFlag {
    fn get(self, chat: &ChatSummary) -> bool {
        match self {
            ChatFlag::Pinned => chat.pinned,
            ChatFlag::Archived => chat.archived,
        }
    }

    fn set(self, chat: &mut ChatSummary, value: bool) {
        match self {
            ChatFlag::Pinned => chat.pinned = value,
            ChatFlag::Archived => chat.archived = value,
        }
    }

    fn update(self, value: bool) -> ChatUpdate {
        match self {
            ChatFlag::Pinned => ChatUpdate::pinned(value),
            ChatFlag::Archived => ChatUpdate::archived(value),
        }
    }
}

type Callback = Arc<dyn Fn(&DirectoryEvent) + Send + Sync>;
type PendingLoad = Shared<BoxFuture<'static, ()>>;

struct Subscriber {
    id: u64,
    owner: InstanceId,
    include_own: bool,
    callback: Callback,
}

#[derive(Default)]
struct DirectoryState {
    chats: Vec<ChatSummary>,
    loaded: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide chat directory service
pub struct ChatDirectory {
    backend: Arc<dyn Backend>,
    keys: Arc<dyn KeyStore>,
    titles: TitlePolicy,
    state: Mutex<DirectoryState>,
    publish: Mutex<()>,
    in_flight: Mutex<Option<PendingLoad>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
}

impl ChatDirectory {
    /// Creates the shared directory service
    pub fn new(backend: Arc<dyn Backend>, keys: Arc<dyn KeyStore>, titles: TitlePolicy) -> Arc<Self> {
        Arc::new(Self {
            backend,
            keys,
            titles,
            state: Mutex::new(DirectoryState::default()),
            publish: Mutex::new(()),
            in_flight: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
        })
    }

    /// Registers a new consumer
    pub fn handle(self: &Arc<Self>) -> DirectoryHandle {
        DirectoryHandle {
            id: Uuid::new_v4(),
            directory: Arc::clone(self),
        }
    }

    /// Current sorted directory
    pub fn chats(&self) -> Vec<ChatSummary> {
        lock(&self.state).chats.clone()
    }

    /// Looks up one chat
    pub fn get(&self, id: &str) -> Option<ChatSummary> {
        lock(&self.state).chats.iter().find(|c| c.id == id).cloned()
    }

    /// Whether a load has completed successfully
    pub fn is_loaded(&self) -> bool {
        lock(&self.state).loaded
    }

    /// Title rules used by this directory
    pub fn title_policy(&self) -> &TitlePolicy {
        &self.titles
    }

    async fn load_as(self: &Arc<Self>, source: InstanceId, force_refresh: bool) {
        if !force_refresh && self.is_loaded() {
            return;
        }

        let pending = {
            let mut slot = lock(&self.in_flight);
            // A fetch may have published between the check above and taking the slot
            if !force_refresh && slot.is_none() && self.is_loaded() {
                return;
            }
            match slot.as_ref() {
                Some(pending) => {
                    tracing::debug!("Joining in-flight directory fetch");
                    pending.clone()
                }
                None => {
                    let this = Arc::clone(self);
                    let pending = async move { this.fetch_and_publish(source).await }
                        .boxed()
                        .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await;
    }

    async fn fetch_and_publish(self: Arc<Self>, source: InstanceId) {
        match self.fetch_directory().await {
            Ok(chats) => {
                tracing::debug!("Loaded {} chats", chats.len());
                self.replace_all(chats, source);
            }
            Err(e) => {
                tracing::warn!("Failed to load chat directory: {:#}", e);
            }
        }
        *lock(&self.in_flight) = None;
    }

    async fn fetch_directory(&self) -> Result<Vec<ChatSummary>> {
        let raw = self
            .backend
            .get_chats()
            .await
            .map_err(|e| SyncError::Network(format!("get_chats: {:#}", e)))?;
        let raw = dedup_by_id(raw);

        let needs_keys = raw.iter().any(|c| c.encrypted_title.is_some() && c.iv.is_some());
        let keys = if needs_keys {
            Some(self.keys.user_keys()?)
        } else {
            None
        };

        Ok(raw
            .into_iter()
            .map(|chat| {
                let title = self.decrypt_title(&chat, keys.as_ref());
                ChatSummary {
                    id: chat.id,
                    title,
                    pinned: chat.pinned,
                    archived: chat.archived,
                    created_at: chat.created_at,
                    last_message_at: chat.last_message_at,
                }
            })
            .collect())
    }

    /// Decrypts and sanitizes a stored title, degrading to the default title
    fn decrypt_title(&self, chat: &RawChat, keys: Option<&UserKeys>) -> String {
        let Some(stored) = chat.encrypted_title.as_deref() else {
            return self.titles.default_title.clone();
        };

        let Some(iv) = chat.iv.as_deref() else {
            // Legacy plain title, usually a JSON string
            let plain = serde_json::from_str::<String>(stored).unwrap_or_else(|_| stored.to_string());
            return self.titles.sanitize(&plain);
        };

        let (Some(encapsulated_key), Some(keys)) = (chat.encapsulated_key.as_deref(), keys) else {
            tracing::warn!("Chat {} has an encrypted title without a usable key", chat.id);
            return self.titles.default_title.clone();
        };

        match decapsulate_and_decrypt(stored, iv, encapsulated_key, &keys.kem.secret) {
            Ok(decrypted) => self.titles.sanitize(&decrypted.plaintext),
            Err(e) => {
                tracing::warn!("Failed to decrypt title of chat {}: {:#}", chat.id, e);
                self.titles.default_title.clone()
            }
        }
    }

    fn replace_all(&self, chats: Vec<ChatSummary>, source: InstanceId) {
        self.modify(source, |state| {
            state.chats = chats;
            state.loaded = true;
            Some(())
        });
    }

    /// Applies `change`, re-sorts and publishes before returning
    ///
    /// When `change` returns `None` nothing was modified and nothing is
    /// published. The publish lock is held until every subscriber has run;
    /// the state lock is not.
    fn modify<R>(
        &self,
        source: InstanceId,
        change: impl FnOnce(&mut DirectoryState) -> Option<R>,
    ) -> Option<R> {
        let _publishing = lock(&self.publish);
        let (result, snapshot) = {
            let mut state = lock(&self.state);
            let result = change(&mut state)?;
            sort_by_recency(&mut state.chats);
            (result, state.chats.clone())
        };

        self.notify(&DirectoryEvent {
            chats: snapshot,
            source_instance_id: source,
        });
        Some(result)
    }

    fn notify(&self, event: &DirectoryEvent) {
        let targets: Vec<Callback> = lock(&self.subscribers)
            .iter()
            .filter(|s| s.include_own || s.owner != event.source_instance_id)
            .map(|s| Arc::clone(&s.callback))
            .collect();

        for callback in targets {
            callback(event);
        }
    }

    fn add_subscriber(self: &Arc<Self>, owner: InstanceId, include_own: bool, callback: Callback) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).push(Subscriber {
            id,
            owner,
            include_own,
            callback,
        });
        Subscription {
            id,
            directory: Arc::downgrade(self),
        }
    }

    fn remove_subscriber(&self, id: u64) {
        lock(&self.subscribers).retain(|s| s.id != id);
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

/// Keeps a directory callback registered until dropped
pub struct Subscription {
    id: u64,
    directory: Weak<ChatDirectory>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(directory) = self.directory.upgrade() {
            directory.remove_subscriber(self.id);
        }
    }
}

/// A consumer's view of the shared directory
#[derive(Clone)]
pub struct DirectoryHandle {
    id: InstanceId,
    directory: Arc<ChatDirectory>,
}

impl DirectoryHandle {
    /// This consumer's instance id
    pub fn instance_id(&self) -> InstanceId {
        self.id
    }

    /// The shared directory service
    pub fn directory(&self) -> &Arc<ChatDirectory> {
        &self.directory
    }

    /// Current sorted directory
    pub fn chats(&self) -> Vec<ChatSummary> {
        self.directory.chats()
    }

    /// Loads the directory from the backend
    ///
    /// No-op once loaded unless `force_refresh` is set. Concurrent callers
    /// share one backend fetch. Failures are logged and leave the directory
    /// unloaded so the next call retries.
    pub async fn load(&self, force_refresh: bool) {
        self.directory.load_as(self.id, force_refresh).await;
    }

    /// Calls `callback` on every publish, including this consumer's own changes
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DirectoryEvent) + Send + Sync + 'static,
    {
        self.directory.add_subscriber(self.id, true, Arc::new(callback))
    }

    /// Calls `callback` only for changes made by other consumers
    pub fn subscribe_others<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DirectoryEvent) + Send + Sync + 'static,
    {
        self.directory.add_subscriber(self.id, false, Arc::new(callback))
    }

    /// Pins or unpins a chat
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ChatNotFound` if the chat is not in the directory.
    /// Backend failures are not errors: the change is rolled back and
    /// [`MutationOutcome::RolledBack`] is returned.
    pub async fn pin(&self, chat_id: &str, pinned: bool) -> Result<MutationOutcome> {
        self.set_flag(chat_id, ChatFlag::Pinned, pinned).await
    }

    /// Archives or restores a chat; same semantics as [`DirectoryHandle::pin`]
    pub async fn archive(&self, chat_id: &str, archived: bool) -> Result<MutationOutcome> {
        self.set_flag(chat_id, ChatFlag::Archived, archived).await
    }

    async fn set_flag(&self, chat_id: &str, flag: ChatFlag, value: bool) -> Result<MutationOutcome> {
        let previous = self
            .directory
            .modify(self.id, |state| {
                let chat = state.chats.iter_mut().find(|c| c.id == chat_id)?;
                let previous = flag.get(chat);
                flag.set(chat, value);
                Some(previous)
            })
            .ok_or_else(|| SyncError::ChatNotFound(chat_id.to_string()))?;

        match self.directory.backend.update_chat(chat_id, flag.update(value)).await {
            Ok(()) => Ok(MutationOutcome::Applied),
            Err(e) => {
                tracing::warn!("Failed to update {:?} on chat {}, rolling back: {:#}", flag, chat_id, e);
                self.directory.modify(self.id, |state| {
                    let chat = state.chats.iter_mut().find(|c| c.id == chat_id)?;
                    flag.set(chat, previous);
                    Some(())
                });
                Ok(MutationOutcome::RolledBack)
            }
        }
    }

    /// Renames a chat
    ///
    /// The sanitized title is shown immediately, then encrypted for the
    /// user's own public key and sent to the backend.
    ///
    /// # Errors
    ///
    /// Returns the key store or backend error unchanged. The optimistic title
    /// is not rolled back; the caller decides how to surface the failure.
    pub async fn rename(&self, chat_id: &str, new_title: &str) -> Result<()> {
        let title = self.directory.titles.sanitize(new_title);
        self.directory
            .modify(self.id, |state| {
                let chat = state.chats.iter_mut().find(|c| c.id == chat_id)?;
                chat.title = title.clone();
                Some(())
            })
            .ok_or_else(|| SyncError::ChatNotFound(chat_id.to_string()))?;

        let keys = self.directory.keys.user_keys()?;
        let sealed = encrypt_for_recipient(&title, &keys.kem.public)?;
        let update = ChatUpdate {
            title: Some(sealed.ciphertext),
            iv: Some(sealed.iv),
            encapsulated_key: sealed.encapsulated_key,
            ..Default::default()
        };

        self.directory.backend.update_chat(chat_id, update).await?;
        Ok(())
    }

    /// Deletes a chat
    ///
    /// On backend failure the whole directory is reloaded, since the removed
    /// entry cannot be reliably restored in place.
    pub async fn delete(&self, chat_id: &str) -> Result<MutationOutcome> {
        self.directory
            .modify(self.id, |state| {
                let index = state.chats.iter().position(|c| c.id == chat_id)?;
                state.chats.remove(index);
                Some(())
            })
            .ok_or_else(|| SyncError::ChatNotFound(chat_id.to_string()))?;

        match self.directory.backend.delete_chat(chat_id).await {
            Ok(()) => Ok(MutationOutcome::Applied),
            Err(e) => {
                tracing::warn!("Failed to delete chat {}, resynchronizing: {:#}", chat_id, e);
                self.directory.load_as(self.id, true).await;
                Ok(MutationOutcome::Resynchronized)
            }
        }
    }

    /// Inserts a chat or replaces the entry with the same id
    pub fn upsert(&self, chat: ChatSummary) {
        self.directory.modify(self.id, |state| {
            match state.chats.iter_mut().find(|c| c.id == chat.id) {
                Some(existing) => *existing = chat,
                None => state.chats.push(chat),
            }
            Some(())
        });
    }

    /// Records activity on a chat, moving it up the directory
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ChatNotFound` if the chat is not in the directory
    pub fn touch(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.directory
            .modify(self.id, |state| {
                let chat = state.chats.iter_mut().find(|c| c.id == chat_id)?;
                chat.last_message_at = Some(at);
                Some(())
            })
            .ok_or_else(|| SyncError::ChatNotFound(chat_id.to_string()))?;
        Ok(())
    }
}
