//! Identity error types

use crate::crypto::CryptoError;
use thiserror::Error;

/// Errors raised by the identity codec and manager.
///
/// `Clone` so that a shared in-flight load can hand the same failure to every
/// waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Structurally invalid encoded or exported identity
    #[error("Malformed identity: {0}")]
    MalformedIdentity(String),

    /// Passphrase-protected material failed authentication
    #[error("Decryption failed: wrong passphrase")]
    DecryptionFailed,

    /// No activation candidate could be decrypted with the passphrase
    #[error("Activation failed: wrong passphrase")]
    ActivationFailed,

    #[error("No identity is present on this device")]
    NoIdentity,

    #[error("Local store error: {0}")]
    Storage(String),

    #[error("Key server error: {0}")]
    KeyServer(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl IdentityError {
    /// Whether the user can recover by supplying a different passphrase
    pub fn is_wrong_passphrase(&self) -> bool {
        matches!(self, IdentityError::DecryptionFailed | IdentityError::ActivationFailed)
    }
}
