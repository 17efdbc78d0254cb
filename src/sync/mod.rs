//! Conversation sync facade
//!
//! [`ConversationSync`] ties the pieces together: it fetches raw messages,
//! decrypts them, repairs their lineage and returns the branch to display.
//! It also decrypts streamed response chunks and seals outgoing messages.
//!
//! A message that fails to decrypt does not fail the history. Its content
//! is replaced by a placeholder and `decryption_failed` is set.

use crate::backend::{Backend, RawMessage};
use crate::crypto::{
    decapsulate_session_key, decrypt_with_session_key, encrypt_for_recipient,
    encrypt_with_session_key, EncryptedPayload, SessionKey,
};
use crate::error::{Result, SyncError};
use crate::keystore::{KeyStore, UserKeys};
use crate::lineage::{build_branch, Branch};
use crate::messages::{extract_thinking, Feedback, Message, Role, TimingMetrics};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub mod stream;

pub use stream::{StreamChunk, StreamDecoder};

/// Content shown in place of a message that could not be decrypted
pub const DECRYPTION_PLACEHOLDER: &str = "[Decryption Failed]";

/// Decrypted conversation: the displayed branch plus every message
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationHistory {
    /// Branch ending at the newest leaf
    pub branch: Branch,
    /// All decrypted messages, including those on other branches
    pub messages: Vec<Message>,
}

impl ConversationHistory {
    /// Builds a history from already-decrypted messages
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let branch = build_branch(&messages, None);
        Self { branch, messages }
    }

    /// Branch ending at `leaf_id`, derived without decrypting again
    pub fn branch_for_leaf(&self, leaf_id: &str) -> Branch {
        build_branch(&self.messages, Some(leaf_id))
    }

    /// Switches the version shown at `slot_index` of `branch`
    ///
    /// Below the switched slot the newest descendants are shown. Returns
    /// `None` if the slot or version does not exist.
    pub fn select_version(&self, branch: &Branch, slot_index: usize, version_index: usize) -> Option<Branch> {
        let version_id = branch.version_id(slot_index, version_index)?;
        Some(build_branch(&self.messages, Some(version_id)))
    }

    /// Number of messages replaced by the placeholder
    pub fn failed_count(&self) -> usize {
        self.messages.iter().filter(|m| m.decryption_failed).count()
    }
}

/// Entry point for reading and writing conversation content
pub struct ConversationSync {
    backend: Arc<dyn Backend>,
    keys: Arc<dyn KeyStore>,
    placeholder: String,
}

impl ConversationSync {
    /// Creates a facade over `backend`, using `keys` for the current user
    pub fn new(backend: Arc<dyn Backend>, keys: Arc<dyn KeyStore>) -> Self {
        Self {
            backend,
            keys,
            placeholder: DECRYPTION_PLACEHOLDER.to_string(),
        }
    }

    /// Overrides the content used for undecryptable messages
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Fetches, decrypts and reconstructs a conversation
    ///
    /// # Arguments
    ///
    /// * `conversation_id` - Chat whose messages to load
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Network` if the backend call fails and
    /// `SyncError::MissingKeys` if encrypted messages are present but no
    /// keypair is available. Individual message failures are not errors.
    pub async fn decrypt_history(&self, conversation_id: &str) -> Result<ConversationHistory> {
        let raw = self
            .backend
            .get_ai_chat_messages(conversation_id)
            .await
            .map_err(|e| SyncError::Network(format!("get_ai_chat_messages: {:#}", e)))?;

        let keys = if raw.iter().any(is_encrypted) {
            Some(self.keys.user_keys()?)
        } else {
            None
        };

        let messages: Vec<Message> = raw
            .iter()
            .filter_map(|record| self.decode_message(record, keys.as_ref()))
            .collect();

        let history = ConversationHistory::from_messages(messages);
        tracing::debug!(
            "Decrypted {} messages for {} ({} failed, branch length {})",
            history.messages.len(),
            conversation_id,
            history.failed_count(),
            history.branch.len()
        );
        Ok(history)
    }

    /// Decrypts one chunk of a streamed response
    ///
    /// The first chunk passes `encapsulated_key`; later chunks pass the
    /// session key returned by the previous call. A chunk that fails
    /// authentication yields empty text and the unchanged session key.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MissingKeys` when neither a session key nor an
    /// encapsulated key is supplied, and any hard decryption failure.
    pub fn decrypt_stream_chunk(
        &self,
        ciphertext: &str,
        iv: &str,
        encapsulated_key: Option<&str>,
        existing_session_key: Option<&SessionKey>,
    ) -> Result<StreamChunk> {
        stream::decrypt_chunk(
            self.keys.as_ref(),
            ciphertext,
            iv,
            encapsulated_key,
            existing_session_key,
        )
    }

    /// Creates a decoder for a new streamed response
    pub fn stream_decoder(&self) -> StreamDecoder {
        StreamDecoder::new(Arc::clone(&self.keys))
    }

    /// Encrypts an outgoing message
    ///
    /// With a session key the symmetric path is used and no encapsulated key
    /// is produced. Without one the message is encrypted for the user's own
    /// public key.
    pub fn seal_outgoing(&self, plaintext: &str, session_key: Option<&SessionKey>) -> Result<EncryptedPayload> {
        match session_key {
            Some(key) => encrypt_with_session_key(plaintext, key),
            None => {
                let keys = self.keys.user_keys()?;
                encrypt_for_recipient(plaintext, &keys.kem.public)
            }
        }
    }

    fn decode_message(&self, raw: &RawMessage, keys: Option<&UserKeys>) -> Option<Message> {
        let role = match raw.role.parse::<Role>() {
            Ok(role) => role,
            Err(e) => {
                tracing::warn!("Skipping message {}: {}", raw.id, e);
                return None;
            }
        };

        let message = match open_message(raw, role, keys) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Failed to decrypt message {}: {:#}", raw.id, e);
                let mut message = Message::new(
                    raw.id.clone(),
                    role,
                    self.placeholder.clone(),
                    raw.parent_id.clone(),
                    raw.created_at,
                );
                message.model = raw.model.clone();
                message.decryption_failed = true;
                message
            }
        };
        Some(message)
    }
}

fn is_encrypted(raw: &RawMessage) -> bool {
    [
        &raw.iv,
        &raw.reasoning_iv,
        &raw.citations_iv,
        &raw.suggestions_iv,
        &raw.steps_iv,
        &raw.sources_iv,
        &raw.tool_calls_iv,
    ]
    .iter()
    .any(|iv| iv.is_some())
}

/// Decrypts content and augmentations under one decapsulated session key
fn open_message(raw: &RawMessage, role: Role, keys: Option<&UserKeys>) -> Result<Message> {
    let session_key = if is_encrypted(raw) {
        let keys = keys.ok_or(SyncError::MissingKeys)?;
        let encapsulated_key = raw.encapsulated_key.as_deref().ok_or_else(|| {
            SyncError::MalformedCiphertext("encrypted message has no encapsulated_key".to_string())
        })?;
        Some(decapsulate_session_key(encapsulated_key, &keys.kem.secret)?)
    } else {
        None
    };
    let session_key = session_key.as_ref();

    let content = match raw.iv.as_deref() {
        Some(iv) => decrypt_with_session_key(&raw.content, iv, require(session_key)?)?,
        None => raw.content.clone(),
    };

    let mut message = Message::new(raw.id.clone(), role, content, raw.parent_id.clone(), raw.created_at);
    message.model = raw.model.clone();
    message.feedback = raw.feedback.as_deref().and_then(|f| f.parse::<Feedback>().ok());
    message.metrics = raw
        .metrics
        .clone()
        .and_then(|m| serde_json::from_value::<TimingMetrics>(m).ok());

    message.reasoning = open_augmentation("reasoning", &raw.reasoning, &raw.reasoning_iv, session_key);
    message.citations =
        open_augmentation("citations", &raw.citations, &raw.citations_iv, session_key).unwrap_or_default();
    message.suggestions =
        open_augmentation("suggestions", &raw.suggestions, &raw.suggestions_iv, session_key).unwrap_or_default();
    message.steps = open_augmentation("steps", &raw.steps, &raw.steps_iv, session_key).unwrap_or_default();
    message.sources = open_augmentation("sources", &raw.sources, &raw.sources_iv, session_key).unwrap_or_default();
    message.tool_calls =
        open_augmentation("tool_calls", &raw.tool_calls, &raw.tool_calls_iv, session_key).unwrap_or_default();

    if message.role == Role::Assistant && message.reasoning.is_none() {
        let split = extract_thinking(&message.content);
        message.content = split.content;
        message.reasoning = split.reasoning;
    }

    Ok(message)
}

fn require(session_key: Option<&SessionKey>) -> Result<&SessionKey> {
    session_key.ok_or_else(|| SyncError::MissingKeys.into())
}

/// Decodes one augmentation field; failures drop the field with a warning
fn open_augmentation<T: DeserializeOwned>(
    name: &str,
    value: &Option<Value>,
    iv: &Option<String>,
    session_key: Option<&SessionKey>,
) -> Option<T> {
    let value = value.as_ref()?;
    match decode_augmentation(value, iv.as_deref(), session_key) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("Dropping unreadable {} field: {:#}", name, e);
            None
        }
    }
}

fn decode_augmentation<T: DeserializeOwned>(
    value: &Value,
    iv: Option<&str>,
    session_key: Option<&SessionKey>,
) -> Result<T> {
    let Some(iv) = iv else {
        return Ok(serde_json::from_value(value.clone())?);
    };

    let ciphertext = value.as_str().ok_or_else(|| {
        SyncError::MalformedCiphertext("encrypted field is not a string".to_string())
    })?;
    let plaintext = decrypt_with_session_key(ciphertext, iv, require(session_key)?)?;

    // Text fields may be stored without JSON quoting
    match serde_json::from_str(&plaintext) {
        Ok(parsed) => Ok(parsed),
        Err(_) => Ok(serde_json::from_value(Value::String(plaintext))?),
    }
}
