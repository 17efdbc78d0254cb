//! Key store interface
//!
//! The sync engine never generates or rotates keys. It asks a [`KeyStore`]
//! for the current user's KEM keypair whenever it needs to encrypt or decrypt.

use crate::crypto::KemKeyPair;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The current user's keys, as handed out by a [`KeyStore`]
#[derive(Debug, Clone)]
pub struct UserKeys {
    /// KEM keypair used for encapsulation/decapsulation
    pub kem: KemKeyPair,
    /// Base64 public key, as registered with the backend
    pub kem_public_key_b64: String,
}

impl UserKeys {
    /// Wraps a keypair, computing the base64 public key
    pub fn new(kem: KemKeyPair) -> Self {
        let kem_public_key_b64 = kem.public.to_base64();
        Self {
            kem,
            kem_public_key_b64,
        }
    }
}

/// Source of the authenticated user's keypair
pub trait KeyStore: Send + Sync {
    /// Whether a keypair is currently available
    fn has_keys(&self) -> bool;

    /// Returns the user's keys
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MissingKeys` if no keypair is available
    fn user_keys(&self) -> Result<UserKeys>;
}

/// On-disk keypair format: base64 public and private keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    /// Base64 Kyber-768 public key
    pub public_key: String,
    /// Base64 Kyber-768 private key
    pub private_key: String,
}

/// Key store holding a fixed keypair for the lifetime of the session
#[derive(Debug, Clone, Default)]
pub struct StaticKeyStore {
    keys: Option<UserKeys>,
}

impl StaticKeyStore {
    /// Creates a store holding `kem`
    pub fn new(kem: KemKeyPair) -> Self {
        Self {
            keys: Some(UserKeys::new(kem)),
        }
    }

    /// Creates a store with no keys (signed-out session)
    pub fn empty() -> Self {
        Self { keys: None }
    }

    /// Loads a keypair from a JSON key file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON,
    /// or contains invalid key material
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Failed to read key file {}: {}", path.display(), e))
        })?;
        let file: KeyFile = serde_json::from_str(&contents)?;
        let kem = KemKeyPair::from_base64(&file.public_key, &file.private_key)?;
        tracing::debug!("Loaded keypair from {}", path.display());
        Ok(Self::new(kem))
    }
}

impl KeyStore for StaticKeyStore {
    fn has_keys(&self) -> bool {
        self.keys.is_some()
    }

    fn user_keys(&self) -> Result<UserKeys> {
        self.keys
            .clone()
            .ok_or_else(|| SyncError::MissingKeys.into())
    }
}
