use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use pqcrypto_kyber::kyber768;
use pqcrypto_traits::kem::{PublicKey as _, SecretKey as _};
use pqsync::backend::{Backend, ChatUpdate, RawChat, RawMessage, Snapshot};
use pqsync::crypto::{encrypt_for_recipient, encrypt_with_session_key, kem, KemKeyPair, SessionKey};
use pqsync::error::{Result, SyncError};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Raw public and private key bytes
#[allow(dead_code)]
pub struct TestKeys {
    pub public: Vec<u8>,
    pub secret: Vec<u8>,
}

#[allow(dead_code)]
impl TestKeys {
    pub fn generate() -> Self {
        let (pk, sk) = kyber768::keypair();
        Self {
            public: pk.as_bytes().to_vec(),
            secret: sk.as_bytes().to_vec(),
        }
    }

    pub fn pair(&self) -> KemKeyPair {
        KemKeyPair::from_bytes(&self.public, &self.secret).expect("valid keypair")
    }

    pub fn write_key_file(&self, dir: &TempDir) -> PathBuf {
        let path = dir.path().join("keys.json");
        let json = serde_json::json!({
            "public_key": STANDARD.encode(&self.public),
            "private_key": STANDARD.encode(&self.secret),
        });
        fs::write(&path, json.to_string()).expect("failed to write key file");
        path
    }
}

#[allow(dead_code)]
pub fn ts(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

#[allow(dead_code)]
pub fn encrypted_chat(keys: &KemKeyPair, id: &str, title: &str, created_at: &str) -> RawChat {
    let sealed = encrypt_for_recipient(title, &keys.public).expect("encrypt title");
    RawChat {
        id: id.to_string(),
        encrypted_title: Some(sealed.ciphertext),
        iv: Some(sealed.iv),
        encapsulated_key: sealed.encapsulated_key,
        pinned: false,
        archived: false,
        created_at: ts(created_at),
        last_message_at: None,
    }
}

#[allow(dead_code)]
pub fn encrypted_message(
    keys: &KemKeyPair,
    id: &str,
    role: &str,
    content: &str,
    parent_id: Option<&str>,
    created_at: &str,
) -> RawMessage {
    let encapsulation = kem::encapsulate(&keys.public);
    let session_key = SessionKey::derive(&encapsulation.shared_secret).expect("derive key");
    let sealed = encrypt_with_session_key(content, &session_key).expect("encrypt content");
    RawMessage {
        id: id.to_string(),
        role: role.to_string(),
        content: sealed.ciphertext,
        iv: Some(sealed.iv),
        encapsulated_key: Some(STANDARD.encode(&encapsulation.encapsulated_key)),
        parent_id: parent_id.map(str::to_string),
        created_at: ts(created_at),
        ..Default::default()
    }
}

/// Writes `snapshot` to `dir` and returns its path
#[allow(dead_code)]
pub fn write_snapshot(dir: &TempDir, snapshot: &Snapshot) -> PathBuf {
    let path = dir.path().join("snapshot.json");
    fs::write(&path, serde_json::to_string_pretty(snapshot).expect("serialize snapshot"))
        .expect("failed to write snapshot");
    path
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Backend that counts directory fetches and can be told to fail
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingBackend {
    pub chats: Mutex<Vec<RawChat>>,
    pub get_chats_calls: AtomicUsize,
    pub fail_updates: AtomicBool,
}

#[allow(dead_code)]
impl CountingBackend {
    pub fn new(chats: Vec<RawChat>) -> Self {
        Self {
            chats: Mutex::new(chats),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.get_chats_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for CountingBackend {
    async fn get_chats(&self) -> Result<Vec<RawChat>> {
        self.get_chats_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn update_chat(&self, id: &str, update: ChatUpdate) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(SyncError::Network("simulated outage".to_string()).into());
        }
        let mut chats = self.chats.lock().unwrap();
        let chat = chats
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SyncError::ChatNotFound(id.to_string()))?;
        if let Some(pinned) = update.pinned {
            chat.pinned = pinned;
        }
        if let Some(archived) = update.archived {
            chat.archived = archived;
        }
        Ok(())
    }

    async fn delete_chat(&self, id: &str) -> Result<()> {
        self.chats.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }

    async fn get_ai_chat_messages(&self, _chat_id: &str) -> Result<Vec<RawMessage>> {
        Ok(Vec::new())
    }
}
