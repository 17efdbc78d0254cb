//! Backend interface
//!
//! The backend stores chats and messages as opaque encrypted blobs and is
//! consumed through the [`Backend`] trait. Every encrypted field follows the
//! same convention: `{field, field_iv, encapsulated_key?}`. When the `_iv`
//! sibling is absent the field holds plain JSON (legacy records).

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod snapshot;

pub use snapshot::{Snapshot, SnapshotBackend};

/// A chat directory entry as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChat {
    /// Chat identifier
    pub id: String,
    /// Base64 ciphertext of the title (or a plain JSON string when `iv` is absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_title: Option<String>,
    /// Base64 IV for the title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// Base64 encapsulated key for the title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encapsulated_key: Option<String>,
    /// Whether the chat is pinned
    #[serde(default)]
    pub pinned: bool,
    /// Whether the chat is archived
    #[serde(default)]
    pub archived: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the most recent message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Partial update of a chat record; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatUpdate {
    /// New encrypted title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// IV for the new title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// Encapsulated key for the new title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encapsulated_key: Option<String>,
    /// New pinned flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    /// New archived flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

impl ChatUpdate {
    /// Update that only changes the pinned flag
    pub fn pinned(pinned: bool) -> Self {
        Self {
            pinned: Some(pinned),
            ..Default::default()
        }
    }

    /// Update that only changes the archived flag
    pub fn archived(archived: bool) -> Self {
        Self {
            archived: Some(archived),
            ..Default::default()
        }
    }
}

/// A stored message as returned by the backend
///
/// `content` is base64 ciphertext when `iv` is present. The augmentation
/// fields are either base64 strings (with their `_iv` sibling) or plain JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Message identifier
    pub id: String,
    /// Sender role (`user`, `assistant` or `system`)
    pub role: String,
    /// Message content
    #[serde(default)]
    pub content: String,
    /// IV for `content`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// Encapsulated key for the message; every encrypted field shares it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encapsulated_key: Option<String>,
    /// Parent message; absent on legacy records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Model that produced an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// User feedback on the message (`positive` / `negative`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Generation timing metrics (plain JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Value>,
    /// Reasoning text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<serde_json::Value>,
    /// IV for `reasoning`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_iv: Option<String>,
    /// Citations list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<serde_json::Value>,
    /// IV for `citations`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations_iv: Option<String>,
    /// Follow-up suggestions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<serde_json::Value>,
    /// IV for `suggestions`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions_iv: Option<String>,
    /// Agentic steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<serde_json::Value>,
    /// IV for `steps`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps_iv: Option<String>,
    /// Retrieved sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<serde_json::Value>,
    /// IV for `sources`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_iv: Option<String>,
    /// Tool invocations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
    /// IV for `tool_calls`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls_iv: Option<String>,
}

/// CRUD operations over chats and messages
///
/// Timeouts and retries are the implementation's responsibility.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetches the full chat directory
    async fn get_chats(&self) -> Result<Vec<RawChat>>;

    /// Applies a partial update to a chat
    async fn update_chat(&self, id: &str, update: ChatUpdate) -> Result<()>;

    /// Deletes a chat and its messages
    async fn delete_chat(&self, id: &str) -> Result<()>;

    /// Fetches every stored message of a conversation
    async fn get_ai_chat_messages(&self, chat_id: &str) -> Result<Vec<RawMessage>>;
}
