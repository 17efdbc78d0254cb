//! Crypto session manager
//!
//! All key-encapsulation and symmetric-cipher operations live here. Callers
//! only ever see base64 strings and [`SessionKey`] handles.
//!
//! Decapsulation is the expensive step and is keyed by the recipient's private
//! key. A streaming caller decapsulates once on the first chunk and passes the
//! returned session key back for every later chunk.
//!
//! # Example
//!
//! ```no_run
//! use pqsync::crypto::{decapsulate_and_decrypt, encrypt_for_recipient, KemKeyPair};
//!
//! # fn demo(keys: &KemKeyPair) -> pqsync::error::Result<()> {
//! let sealed = encrypt_for_recipient("hello", &keys.public)?;
//! let opened = decapsulate_and_decrypt(
//!     &sealed.ciphertext,
//!     &sealed.iv,
//!     sealed.encapsulated_key.as_deref().unwrap_or_default(),
//!     &keys.secret,
//! )?;
//! assert_eq!(opened.plaintext, "hello");
//! # Ok(())
//! # }
//! ```

pub mod cipher;
pub mod kem;

pub use cipher::{SessionKey, IV_LEN, SESSION_KEY_LEN};
pub use kem::{KemKeyPair, KemPublicKey, KemSecretKey};

use crate::error::{Result, SyncError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Base64-encoded ciphertext as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Base64 ciphertext (including the authentication tag)
    pub ciphertext: String,
    /// Base64 IV
    pub iv: String,
    /// Base64 encapsulated key; only present on the asymmetric path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encapsulated_key: Option<String>,
}

/// Result of a first-use decryption
#[derive(Debug)]
pub struct Decrypted {
    /// Recovered plaintext
    pub plaintext: String,
    /// Session key derived during decapsulation, reusable for later chunks
    pub session_key: SessionKey,
}

/// Decodes a base64 field, reporting failures as malformed ciphertext
pub(crate) fn decode_field(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| SyncError::MalformedCiphertext(format!("{}: {}", field, e)).into())
}

fn into_utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| SyncError::HardDecryption(format!("plaintext is not UTF-8: {}", e)).into())
}

/// Encrypts `plaintext` for `recipient` under a fresh encapsulated session key
///
/// Each call is independent: a new shared secret, session key and IV are
/// generated and nothing is retained.
pub fn encrypt_for_recipient(plaintext: &str, recipient: &KemPublicKey) -> Result<EncryptedPayload> {
    let encapsulation = kem::encapsulate(recipient);
    let session_key = SessionKey::derive(&encapsulation.shared_secret)?;
    let (ciphertext, iv) = session_key.seal(plaintext.as_bytes())?;

    Ok(EncryptedPayload {
        ciphertext: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(iv),
        encapsulated_key: Some(STANDARD.encode(encapsulation.encapsulated_key)),
    })
}

/// Decapsulates `encapsulated_key` with `own_secret` and decrypts the payload
///
/// Returns the plaintext together with the derived session key so a stream
/// consumer can skip decapsulation on subsequent chunks.
///
/// # Errors
///
/// - `SyncError::MalformedCiphertext` for undecodable fields
/// - `SyncError::SoftDecryption` when authentication fails
/// - `SyncError::HardDecryption` when the plaintext is not UTF-8
pub fn decapsulate_and_decrypt(
    ciphertext: &str,
    iv: &str,
    encapsulated_key: &str,
    own_secret: &KemSecretKey,
) -> Result<Decrypted> {
    let session_key = decapsulate_session_key(encapsulated_key, own_secret)?;
    let plaintext = decrypt_with_session_key(ciphertext, iv, &session_key)?;
    Ok(Decrypted {
        plaintext,
        session_key,
    })
}

/// Recovers the session key carried by `encapsulated_key`
pub fn decapsulate_session_key(encapsulated_key: &str, own_secret: &KemSecretKey) -> Result<SessionKey> {
    let encapsulated = decode_field("encapsulated_key", encapsulated_key)?;
    let shared_secret = kem::decapsulate(&encapsulated, own_secret)?;
    tracing::trace!("Decapsulated session key");
    SessionKey::derive(&shared_secret)
}

/// Decrypts a payload with a session key the caller already holds
///
/// # Errors
///
/// Soft failures (authentication/truncation) surface as
/// `SyncError::SoftDecryption`; everything else is hard.
pub fn decrypt_with_session_key(ciphertext: &str, iv: &str, session_key: &SessionKey) -> Result<String> {
    let ciphertext = decode_field("ciphertext", ciphertext)?;
    let iv = decode_field("iv", iv)?;
    into_utf8(session_key.open(&ciphertext, &iv)?)
}

/// Encrypts under an already-established session key (no encapsulated key)
pub fn encrypt_with_session_key(plaintext: &str, session_key: &SessionKey) -> Result<EncryptedPayload> {
    let (ciphertext, iv) = session_key.seal(plaintext.as_bytes())?;
    Ok(EncryptedPayload {
        ciphertext: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(iv),
        encapsulated_key: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_soft_decryption;
    use crate::test_utils::{test_keypair, test_keypair_other};

    #[test]
    fn test_recipient_roundtrip() {
        let keys = test_keypair();
        let long = "x".repeat(10_000);
        for plaintext in ["", "hello", "multi\nline ✓ unicode", long.as_str()] {
            let sealed = encrypt_for_recipient(plaintext, &keys.public).unwrap();
            let opened = decapsulate_and_decrypt(
                &sealed.ciphertext,
                &sealed.iv,
                sealed.encapsulated_key.as_deref().unwrap(),
                &keys.secret,
            )
            .unwrap();
            assert_eq!(opened.plaintext, plaintext);
        }
    }

    #[test]
    fn test_session_key_reuse_after_decapsulation() {
        let keys = test_keypair();
        let first = encrypt_for_recipient("chunk one", &keys.public).unwrap();
        let opened = decapsulate_and_decrypt(
            &first.ciphertext,
            &first.iv,
            first.encapsulated_key.as_deref().unwrap(),
            &keys.secret,
        )
        .unwrap();

        let second = encrypt_with_session_key("chunk two", &opened.session_key).unwrap();
        assert!(second.encapsulated_key.is_none());
        let text = decrypt_with_session_key(&second.ciphertext, &second.iv, &opened.session_key)
            .unwrap();
        assert_eq!(text, "chunk two");
    }

    #[test]
    fn test_wrong_recipient_is_soft_failure() {
        let keys = test_keypair();
        let other = test_keypair_other();
        let sealed = encrypt_for_recipient("private", &keys.public).unwrap();
        let err = decapsulate_and_decrypt(
            &sealed.ciphertext,
            &sealed.iv,
            sealed.encapsulated_key.as_deref().unwrap(),
            &other.secret,
        )
        .unwrap_err();
        assert!(is_soft_decryption(&err));
    }

    #[test]
    fn test_bad_base64_is_malformed() {
        let key = SessionKey::from_bytes([9; SESSION_KEY_LEN]);
        let err = decrypt_with_session_key("not base64!!", "AAAAAAAAAAAAAAAA", &key).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::MalformedCiphertext(_))
        ));
        assert!(!is_soft_decryption(&err));
    }

    #[test]
    fn test_non_utf8_plaintext_is_hard() {
        let key = SessionKey::from_bytes([9; SESSION_KEY_LEN]);
        let (ct, iv) = key.seal(&[0xff, 0xfe, 0xfd]).unwrap();
        let err =
            decrypt_with_session_key(&STANDARD.encode(ct), &STANDARD.encode(iv), &key).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::HardDecryption(_))
        ));
    }
}
