//! Post-quantum key encapsulation
//!
//! Thin wrapper over Kyber-768 that keeps the `pqcrypto` types out of the
//! rest of the crate and maps length/format failures onto [`SyncError`].

use crate::error::{Result, SyncError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pqcrypto_kyber::kyber768;
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use zeroize::Zeroizing;

/// A recipient's KEM public key
#[derive(Clone)]
pub struct KemPublicKey(kyber768::PublicKey);

/// A user's KEM private key
#[derive(Clone)]
pub struct KemSecretKey(kyber768::SecretKey);

/// The user's KEM keypair as supplied by a key store
#[derive(Clone, Debug)]
pub struct KemKeyPair {
    /// Public half, used to encrypt data for this user
    pub public: KemPublicKey,
    /// Private half, used to decapsulate
    pub secret: KemSecretKey,
}

impl KemPublicKey {
    /// Parses a raw public key
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidKey` if the length does not match Kyber-768
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        kyber768::PublicKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| SyncError::InvalidKey(format!("public key: {}", e)).into())
    }

    /// Parses a base64-encoded public key
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SyncError::InvalidKey(format!("public key base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Base64 encoding of the key, as exchanged with the backend
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.as_bytes())
    }
}

impl std::fmt::Debug for KemPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KemPublicKey({} bytes)", self.as_bytes().len())
    }
}

impl KemSecretKey {
    /// Parses a raw private key
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidKey` if the length does not match Kyber-768
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        kyber768::SecretKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| SyncError::InvalidKey(format!("private key: {}", e)).into())
    }

    /// Parses a base64-encoded private key
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| SyncError::InvalidKey(format!("private key base64: {}", e)))?,
        );
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for KemSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KemSecretKey(..)")
    }
}

impl KemKeyPair {
    /// Builds a keypair from raw key bytes
    pub fn from_bytes(public: &[u8], secret: &[u8]) -> Result<Self> {
        Ok(Self {
            public: KemPublicKey::from_bytes(public)?,
            secret: KemSecretKey::from_bytes(secret)?,
        })
    }

    /// Builds a keypair from base64-encoded keys
    pub fn from_base64(public: &str, secret: &str) -> Result<Self> {
        Ok(Self {
            public: KemPublicKey::from_base64(public)?,
            secret: KemSecretKey::from_base64(secret)?,
        })
    }
}

/// Output of an encapsulation: the shared secret and the ciphertext to send
pub struct Encapsulation {
    /// Shared secret, known only to the sender and the recipient
    pub shared_secret: Zeroizing<Vec<u8>>,
    /// Encapsulated key bytes to transmit alongside the ciphertext
    pub encapsulated_key: Vec<u8>,
}

/// Generates a fresh shared secret for `recipient`
pub fn encapsulate(recipient: &KemPublicKey) -> Encapsulation {
    let (shared, ciphertext) = kyber768::encapsulate(&recipient.0);
    Encapsulation {
        shared_secret: Zeroizing::new(shared.as_bytes().to_vec()),
        encapsulated_key: ciphertext.as_bytes().to_vec(),
    }
}

/// Recovers the shared secret from an encapsulated key
///
/// # Errors
///
/// Returns `SyncError::MalformedCiphertext` if the encapsulated key has the
/// wrong length. A well-formed key produced for a different recipient does not
/// fail here; it yields an unrelated secret and the subsequent AEAD open fails.
pub fn decapsulate(encapsulated_key: &[u8], secret: &KemSecretKey) -> Result<Zeroizing<Vec<u8>>> {
    let ciphertext = kyber768::Ciphertext::from_bytes(encapsulated_key).map_err(|e| {
        SyncError::MalformedCiphertext(format!("encapsulated key: {}", e))
    })?;
    let shared = kyber768::decapsulate(&ciphertext, &secret.0);
    Ok(Zeroizing::new(shared.as_bytes().to_vec()))
}
