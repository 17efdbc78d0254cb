//! Decrypted message model
//!
//! A [`Message`] is the plaintext view of a stored record. Loosely-typed
//! payloads (citations, steps, sources, tool calls) are parsed into known
//! shapes where possible and kept as opaque JSON otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod thinking;

pub use thinking::{extract_thinking, ThinkingSplit};

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user
    User,
    /// Model response
    Assistant,
    /// System prompt or notice
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// User feedback attached to an assistant message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    /// Thumbs up
    Positive,
    /// Thumbs down
    Negative,
}

impl FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "up" | "like" => Ok(Feedback::Positive),
            "negative" | "down" | "dislike" => Ok(Feedback::Negative),
            other => Err(format!("unknown feedback: {}", other)),
        }
    }
}

/// Generation timing for an assistant message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingMetrics {
    /// Milliseconds until the first token arrived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_first_token_ms: Option<u64>,
    /// Total generation time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time_ms: Option<u64>,
    /// Output throughput
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_second: Option<f64>,
}

/// A payload that is either a recognised shape or opaque JSON
///
/// # Examples
///
/// ```
/// use pqsync::messages::{Augment, Citation};
///
/// let known: Augment<Citation> =
///     serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
/// assert!(known.known().is_some());
///
/// let opaque: Augment<Citation> = serde_json::from_str(r#"[1, 2, 3]"#).unwrap();
/// assert!(opaque.known().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Augment<T> {
    /// Parsed into the expected shape
    Known(T),
    /// Anything else, preserved verbatim
    Opaque(serde_json::Value),
}

impl<T> Augment<T> {
    /// The parsed value, if the payload had the expected shape
    pub fn known(&self) -> Option<&T> {
        match self {
            Augment::Known(value) => Some(value),
            Augment::Opaque(_) => None,
        }
    }
}

/// A citation referenced by an assistant answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Cited URL
    pub url: String,
    /// Page title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Quoted excerpt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// A retrieved source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Source URL
    pub url: String,
    /// Source title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A tool invocation made while producing an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool call identifier
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool arguments
    #[serde(default)]
    pub arguments: serde_json::Value,
    /// Tool output, when recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// One step of an agentic answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Web or document search
    Search {
        /// Query issued
        query: String,
        /// Results returned
        #[serde(default)]
        results: Vec<Source>,
    },
    /// Tool execution
    ToolCall {
        /// Tool name
        name: String,
        /// Tool arguments
        #[serde(default)]
        arguments: serde_json::Value,
        /// Tool output
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    /// Intermediate reasoning shown to the user
    Thinking {
        /// Reasoning text
        content: String,
    },
}

/// A decrypted conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier
    pub id: String,
    /// Sender role
    pub role: Role,
    /// Displayed content
    pub content: String,
    /// Parent message; `None` for a root
    pub parent_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Model that produced the message
    #[serde(default)]
    pub model: Option<String>,
    /// User feedback
    #[serde(default)]
    pub feedback: Option<Feedback>,
    /// Generation timing
    #[serde(default)]
    pub metrics: Option<TimingMetrics>,
    /// Reasoning text, split out of the content when embedded
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Citations
    #[serde(default)]
    pub citations: Vec<Augment<Citation>>,
    /// Follow-up suggestions
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Agentic steps
    #[serde(default)]
    pub steps: Vec<Augment<Step>>,
    /// Retrieved sources
    #[serde(default)]
    pub sources: Vec<Augment<Source>>,
    /// Tool invocations
    #[serde(default)]
    pub tool_calls: Vec<Augment<ToolCall>>,
    /// Set when the content is a placeholder for an undecryptable record
    #[serde(default)]
    pub decryption_failed: bool,
}

impl Message {
    /// Creates a message with no augmentations
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use pqsync::messages::{Message, Role};
    ///
    /// let msg = Message::new("m1", Role::User, "Hello", None, Utc::now());
    /// assert_eq!(msg.role, Role::User);
    /// assert!(msg.parent_id.is_none());
    /// ```
    pub fn new(
        id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        parent_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            parent_id,
            created_at,
            model: None,
            feedback: None,
            metrics: None,
            reasoning: None,
            citations: Vec::new(),
            suggestions: Vec::new(),
            steps: Vec::new(),
            sources: Vec::new(),
            tool_calls: Vec::new(),
            decryption_failed: false,
        }
    }
}

/// Reduced projection of a sibling message, shown in the version switcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageVersion {
    /// Message identifier
    pub id: String,
    /// Displayed content
    pub content: String,
    /// Tool invocations
    pub tool_calls: Vec<Augment<ToolCall>>,
    /// User feedback
    pub feedback: Option<Feedback>,
    /// Generation timing
    pub metrics: Option<TimingMetrics>,
    /// Producing model
    pub model: Option<String>,
    /// Follow-up suggestions
    pub suggestions: Vec<String>,
    /// Retrieved sources
    pub sources: Vec<Augment<Source>>,
    /// Reasoning text
    pub reasoning: Option<String>,
    /// Agentic steps
    pub steps: Vec<Augment<Step>>,
}

impl From<&Message> for MessageVersion {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            content: msg.content.clone(),
            tool_calls: msg.tool_calls.clone(),
            feedback: msg.feedback,
            metrics: msg.metrics.clone(),
            model: msg.model.clone(),
            suggestions: msg.suggestions.clone(),
            sources: msg.sources.clone(),
            reasoning: msg.reasoning.clone(),
            steps: msg.steps.clone(),
        }
    }
}
