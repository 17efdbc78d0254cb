//! pqsync - post-quantum conversation sync engine
//!
//! This library decrypts, caches and reconstructs end-to-end encrypted chat
//! conversations. Keys are Kyber-768 keypairs; content is sealed with
//! ChaCha20-Poly1305 under a per-message session key.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `crypto`: key encapsulation and session-key encryption
//! - `keystore`: source of the current user's keypair
//! - `backend`: storage interface and the raw encrypted records
//! - `messages`: decrypted message model and reasoning extraction
//! - `lineage`: parent repair and branch reconstruction
//! - `directory`: shared chat list cache with optimistic mutations
//! - `sync`: conversation facade (history, streaming, outgoing messages)
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli` / `commands`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pqsync::backend::SnapshotBackend;
//! use pqsync::keystore::StaticKeyStore;
//! use pqsync::sync::ConversationSync;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = Arc::new(SnapshotBackend::open("snapshot.json")?);
//!     let keys = Arc::new(StaticKeyStore::from_file("keys.json")?);
//!
//!     let sync = ConversationSync::new(backend, keys);
//!     let history = sync.decrypt_history("chat-1").await?;
//!     for message in history.branch.messages() {
//!         println!("{}: {}", message.role, message.content);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod keystore;
pub mod lineage;
pub mod messages;
pub mod sync;

// Re-export commonly used types
pub use config::Config;
pub use directory::{ChatDirectory, ChatSummary, DirectoryHandle, MutationOutcome};
pub use error::{Result, SyncError};
pub use lineage::{build_branch, Branch, BranchSlot};
pub use messages::{Message, Role};
pub use sync::{ConversationHistory, ConversationSync, StreamDecoder};

#[cfg(test)]
pub mod test_utils;
