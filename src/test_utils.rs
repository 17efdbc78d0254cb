//! Test utilities for pqsync
//!
//! Key fixtures, raw record builders and a scriptable in-memory backend.

use crate::backend::{Backend, ChatUpdate, RawChat, RawMessage};
use crate::crypto::{encrypt_for_recipient, encrypt_with_session_key, kem, KemKeyPair, SessionKey};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use pqcrypto_kyber::kyber768;
use pqcrypto_traits::kem::{PublicKey as _, SecretKey as _};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T: std::fmt::Debug>(result: Result<T>, expected: &str) {
    match result {
        Ok(value) => panic!("Expected error containing '{}', got Ok({:?})", expected, value),
        Err(e) => {
            let msg = format!("{:#}", e);
            assert!(
                msg.contains(expected),
                "Expected error containing '{}', got '{}'",
                expected,
                msg
            );
        }
    }
}

/// Parses an RFC 3339 timestamp
pub fn ts(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

static USER_KEYS: OnceLock<(Vec<u8>, Vec<u8>)> = OnceLock::new();
static OTHER_KEYS: OnceLock<(Vec<u8>, Vec<u8>)> = OnceLock::new();

fn generated(slot: &'static OnceLock<(Vec<u8>, Vec<u8>)>) -> &'static (Vec<u8>, Vec<u8>) {
    slot.get_or_init(|| {
        let (pk, sk) = kyber768::keypair();
        (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
    })
}

/// The current user's keypair, shared across tests
pub fn test_keypair() -> KemKeyPair {
    let (public, secret) = generated(&USER_KEYS);
    KemKeyPair::from_bytes(public, secret).expect("valid generated keypair")
}

/// A second, unrelated keypair
pub fn test_keypair_other() -> KemKeyPair {
    let (public, secret) = generated(&OTHER_KEYS);
    KemKeyPair::from_bytes(public, secret).expect("valid generated keypair")
}

/// Writes [`test_keypair`] as a JSON key file and returns its path
pub fn test_key_file(dir: &TempDir) -> PathBuf {
    let (public, secret) = generated(&USER_KEYS);
    let json = serde_json::json!({
        "public_key": STANDARD.encode(public),
        "private_key": STANDARD.encode(secret),
    });
    create_test_file(dir, "keys.json", &json.to_string())
}

/// A chat whose title is stored as plain text
pub fn plain_chat(id: &str, title: &str, created_at: &str) -> RawChat {
    RawChat {
        id: id.to_string(),
        encrypted_title: Some(title.to_string()),
        iv: None,
        encapsulated_key: None,
        pinned: false,
        archived: false,
        created_at: ts(created_at),
        last_message_at: None,
    }
}

/// A chat whose title is encrypted for `keys`
pub fn encrypted_chat(keys: &KemKeyPair, id: &str, title: &str, created_at: &str) -> RawChat {
    let sealed = encrypt_for_recipient(title, &keys.public).expect("encryption succeeds");
    RawChat {
        encrypted_title: Some(sealed.ciphertext),
        iv: Some(sealed.iv),
        encapsulated_key: sealed.encapsulated_key,
        ..plain_chat(id, "", created_at)
    }
}

/// A legacy message stored in plain text
pub fn plain_message(id: &str, role: &str, content: &str, parent_id: Option<&str>, created_at: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        role: role.to_string(),
        content: content.to_string(),
        parent_id: parent_id.map(str::to_string),
        created_at: ts(created_at),
        ..Default::default()
    }
}

/// A message whose content is encrypted for `keys`
pub fn encrypted_message(
    keys: &KemKeyPair,
    id: &str,
    role: &str,
    content: &str,
    parent_id: Option<&str>,
    created_at: &str,
) -> RawMessage {
    MessageSealer::new(keys).message(id, role, content, parent_id, created_at)
}

/// Encrypts a message and its augmentation fields under one session key
pub struct MessageSealer {
    session_key: SessionKey,
    encapsulated_key: String,
}

impl MessageSealer {
    /// Establishes a fresh session key for `keys`
    pub fn new(keys: &KemKeyPair) -> Self {
        let encapsulation = kem::encapsulate(&keys.public);
        Self {
            session_key: SessionKey::derive(&encapsulation.shared_secret).expect("key derivation"),
            encapsulated_key: STANDARD.encode(&encapsulation.encapsulated_key),
        }
    }

    /// The session key shared by every sealed field
    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    /// Encrypted message record
    pub fn message(&self, id: &str, role: &str, content: &str, parent_id: Option<&str>, created_at: &str) -> RawMessage {
        let sealed = encrypt_with_session_key(content, &self.session_key).expect("encryption succeeds");
        RawMessage {
            content: sealed.ciphertext,
            iv: Some(sealed.iv),
            encapsulated_key: Some(self.encapsulated_key.clone()),
            ..plain_message(id, role, "", parent_id, created_at)
        }
    }

    /// Encrypted augmentation value and its IV
    pub fn field(&self, plaintext: &str) -> (serde_json::Value, String) {
        let sealed = encrypt_with_session_key(plaintext, &self.session_key).expect("encryption succeeds");
        (serde_json::Value::String(sealed.ciphertext), sealed.iv)
    }
}

/// In-memory backend with call counters and failure switches
#[derive(Default)]
pub struct FakeBackend {
    chats: Mutex<Vec<RawChat>>,
    messages: Mutex<HashMap<String, Vec<RawMessage>>>,
    updates: Mutex<Vec<(String, ChatUpdate)>>,
    get_chats_calls: AtomicUsize,
    delay_ms: AtomicU64,
    fail_get_chats: AtomicBool,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
    fail_messages: AtomicBool,
}

impl FakeBackend {
    /// Backend serving `chats`
    pub fn with_chats(chats: Vec<RawChat>) -> Self {
        let backend = Self::default();
        *backend.chats.lock().unwrap() = chats;
        backend
    }

    /// Stores the messages of a conversation
    pub fn set_messages(&self, chat_id: &str, messages: Vec<RawMessage>) {
        self.messages
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), messages);
    }

    /// Delays every `get_chats` call
    pub fn set_delay_ms(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn fail_get_chats(&self, fail: bool) {
        self.fail_get_chats.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_messages(&self, fail: bool) {
        self.fail_messages.store(fail, Ordering::SeqCst);
    }

    /// Number of `get_chats` calls so far
    pub fn get_chats_calls(&self) -> usize {
        self.get_chats_calls.load(Ordering::SeqCst)
    }

    /// Updates accepted so far
    pub fn updates(&self) -> Vec<(String, ChatUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_chats(&self) -> Result<Vec<RawChat>> {
        self.get_chats_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_get_chats.load(Ordering::SeqCst) {
            return Err(SyncError::Network("get_chats unavailable".to_string()).into());
        }
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn update_chat(&self, id: &str, update: ChatUpdate) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(SyncError::Network("update_chat unavailable".to_string()).into());
        }
        self.updates.lock().unwrap().push((id.to_string(), update));
        Ok(())
    }

    async fn delete_chat(&self, id: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(SyncError::Network("delete_chat unavailable".to_string()).into());
        }
        self.chats.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }

    async fn get_ai_chat_messages(&self, chat_id: &str) -> Result<Vec<RawMessage>> {
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(SyncError::Network("get_ai_chat_messages unavailable".to_string()).into());
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }
}
