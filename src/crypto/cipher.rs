//! Symmetric layer: session key derivation and ChaCha20-Poly1305 sealing

use crate::error::{Result, SyncError};
use chacha20poly1305::{
    aead::{Aead, OsRng, rand_core::RngCore},
    ChaCha20Poly1305, KeyInit, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Salt used for HKDF session key derivation
const HKDF_SALT: &[u8] = b"pqsync-session-v1";

/// Info label bound into every derived session key
const HKDF_INFO: &[u8] = b"chat-message";

/// Nonce size for ChaCha20-Poly1305 (96 bits / 12 bytes)
pub const IV_LEN: usize = 12;

/// Poly1305 tag length; anything shorter cannot be a complete ciphertext
const TAG_LEN: usize = 16;

/// Length of a derived session key
pub const SESSION_KEY_LEN: usize = 32;

/// Symmetric key derived from a decapsulated shared secret
///
/// Scoped to one message or one stream. The bytes are wiped on drop; cloning
/// is only needed when a caller threads the key through stream continuation.
#[derive(Clone)]
pub struct SessionKey(Zeroizing<[u8; SESSION_KEY_LEN]>);

impl SessionKey {
    /// Derives a session key from a KEM shared secret using HKDF-SHA256
    pub fn derive(shared_secret: &[u8]) -> Result<Self> {
        let hkdf = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared_secret);
        let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
        hkdf.expand(HKDF_INFO, &mut key[..])
            .map_err(|e| SyncError::Encryption(format!("session key derivation: {}", e)))?;
        Ok(Self(key))
    }

    /// Wraps raw key bytes, e.g. a key restored by a streaming caller
    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new((&*self.0).into())
    }

    /// Encrypts `plaintext` under a fresh random IV
    ///
    /// Returns `(ciphertext, iv)`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; IV_LEN])> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| SyncError::Encryption("AEAD seal failed".to_string()))?;

        Ok((ciphertext, iv))
    }

    /// Decrypts and authenticates `ciphertext`
    ///
    /// # Errors
    ///
    /// - `SyncError::MalformedCiphertext` if the IV has the wrong length
    /// - `SyncError::SoftDecryption` if the data is truncated or fails authentication
    pub fn open(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        if iv.len() != IV_LEN {
            return Err(SyncError::MalformedCiphertext(format!(
                "IV must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            ))
            .into());
        }

        if ciphertext.len() < TAG_LEN {
            return Err(SyncError::SoftDecryption(format!(
                "ciphertext too short ({} bytes)",
                ciphertext.len()
            ))
            .into());
        }

        self.cipher()
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| SyncError::SoftDecryption("authentication failed".to_string()).into())
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl Eq for SessionKey {}
