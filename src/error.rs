//! Error types for pqsync
//!
//! This module defines all error types used throughout the sync engine,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for pqsync operations
///
/// Covers key availability, ciphertext decoding, decryption outcomes,
/// backend failures, and the ambient configuration/IO errors of the CLI.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No keypair is available in the key store
    #[error("No keypair available for the current user")]
    MissingKeys,

    /// Ciphertext, IV or encapsulated key could not be decoded
    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// Recoverable decryption failure (authentication tag mismatch, truncated chunk)
    ///
    /// In a streaming context this means "no data yet" and is never surfaced.
    #[error("Soft decryption failure: {0}")]
    SoftDecryption(String),

    /// Fatal decryption failure for a single operation
    #[error("Decryption failed: {0}")]
    HardDecryption(String),

    /// Key material could not be decoded
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Symmetric encryption or key derivation failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Backend call failed
    #[error("Network failure: {0}")]
    Network(String),

    /// Chat does not exist in the directory
    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SyncError {
    /// Returns true for failures that a stream consumer should treat as "no data yet"
    pub fn is_soft(&self) -> bool {
        matches!(self, SyncError::SoftDecryption(_))
    }
}

/// Returns true when `err` wraps a [`SyncError::SoftDecryption`]
///
/// # Examples
///
/// ```
/// use pqsync::error::{is_soft_decryption, SyncError};
///
/// let soft = anyhow::Error::new(SyncError::SoftDecryption("tag mismatch".into()));
/// let hard = anyhow::Error::new(SyncError::HardDecryption("not utf-8".into()));
/// assert!(is_soft_decryption(&soft));
/// assert!(!is_soft_decryption(&hard));
/// ```
pub fn is_soft_decryption(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SyncError>()
        .map(SyncError::is_soft)
        .unwrap_or(false)
}

/// Result type alias for pqsync operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
