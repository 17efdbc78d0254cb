//! Streamed response decryption

use crate::crypto::{decapsulate_session_key, decrypt_with_session_key, SessionKey};
use crate::error::{is_soft_decryption, Result, SyncError};
use crate::keystore::KeyStore;
use crate::messages::{extract_thinking, ThinkingSplit};
use std::sync::Arc;

/// One decrypted stream chunk
#[derive(Debug)]
pub struct StreamChunk {
    /// Decrypted text; empty when the chunk could not be authenticated yet
    pub text: String,
    /// Session key to pass back for the next chunk
    pub session_key: SessionKey,
}

/// Decrypts a single chunk, decapsulating only when no session key is held
pub(crate) fn decrypt_chunk(
    keys: &dyn KeyStore,
    ciphertext: &str,
    iv: &str,
    encapsulated_key: Option<&str>,
    existing_session_key: Option<&SessionKey>,
) -> Result<StreamChunk> {
    let session_key = match (existing_session_key, encapsulated_key) {
        (Some(key), _) => key.clone(),
        (None, Some(encapsulated_key)) => {
            let user = keys.user_keys()?;
            decapsulate_session_key(encapsulated_key, &user.kem.secret)?
        }
        (None, None) => return Err(SyncError::MissingKeys.into()),
    };

    match decrypt_with_session_key(ciphertext, iv, &session_key) {
        Ok(text) => Ok(StreamChunk { text, session_key }),
        Err(e) if is_soft_decryption(&e) => {
            tracing::debug!("Skipping undecryptable stream chunk: {}", e);
            Ok(StreamChunk {
                text: String::new(),
                session_key,
            })
        }
        Err(e) => Err(e),
    }
}

/// Accumulates a streamed assistant response
///
/// The first chunk carrying an encapsulated key establishes the session key;
/// every later chunk reuses it. The key is zeroized when the decoder drops.
pub struct StreamDecoder {
    keys: Arc<dyn KeyStore>,
    session_key: Option<SessionKey>,
    text: String,
    chunks: usize,
    skipped: usize,
}

impl StreamDecoder {
    /// Creates a decoder that fetches the user's keys from `keys`
    pub fn new(keys: Arc<dyn KeyStore>) -> Self {
        Self {
            keys,
            session_key: None,
            text: String::new(),
            chunks: 0,
            skipped: 0,
        }
    }

    /// Decrypts one chunk and appends it, returning the new text
    ///
    /// # Errors
    ///
    /// Hard decryption failures and malformed chunks are returned. Soft
    /// failures are counted and yield an empty string.
    pub fn push(&mut self, ciphertext: &str, iv: &str, encapsulated_key: Option<&str>) -> Result<String> {
        let chunk = decrypt_chunk(
            self.keys.as_ref(),
            ciphertext,
            iv,
            encapsulated_key,
            self.session_key.as_ref(),
        )?;

        self.chunks += 1;
        if chunk.text.is_empty() {
            self.skipped += 1;
        }
        self.text.push_str(&chunk.text);
        if self.session_key.is_none() {
            self.session_key = Some(chunk.session_key);
        }
        Ok(chunk.text)
    }

    /// Text accumulated so far, thinking blocks included
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Session key established by the first chunk
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    /// Number of chunks pushed, and how many of them produced no text
    pub fn stats(&self) -> (usize, usize) {
        (self.chunks, self.skipped)
    }

    /// Ends the stream and splits reasoning out of the accumulated text
    pub fn finish(self) -> ThinkingSplit {
        tracing::debug!(
            "Stream finished after {} chunks ({} skipped)",
            self.chunks,
            self.skipped
        );
        extract_thinking(&self.text)
    }
}
