//! Primitive cryptographic capabilities
//!
//! Everything above this module treats these functions as a narrow, trusted
//! capability interface:
//! - `TopicKey` - the per-topic symmetric key
//! - `wrap_key` / `unwrap_key` - asymmetric wrapping of a topic key for one participant
//! - `encrypt` / `decrypt` - AEAD for topic content such as titles
//! - `derive_passphrase_key` - password based key derivation for identity exports

mod aead;
mod envelope;
mod kdf;
mod topic_key;

pub use aead::{decrypt, encrypt};
pub(crate) use aead::{open, seal};
pub use envelope::{unwrap_key, wrap_key};
pub use kdf::{derive_passphrase_key, SALT_LEN};
pub use topic_key::{TopicKey, TOPIC_KEY_LEN};

use thiserror::Error;

/// Errors raised by the primitive layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    /// AEAD tag mismatch: wrong key or tampered data
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}
