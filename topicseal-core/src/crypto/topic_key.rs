use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CryptoError;

/// Length of a topic key in bytes (AES-256)
pub const TOPIC_KEY_LEN: usize = 32;

/// Symmetric key protecting all content of one encrypted topic.
/// Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct TopicKey([u8; TOPIC_KEY_LEN]);

impl TopicKey {
    /// Generate a fresh random topic key
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOPIC_KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        TopicKey(bytes)
    }

    pub fn from_bytes(bytes: [u8; TOPIC_KEY_LEN]) -> Self {
        TopicKey(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; TOPIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "topic key must be {} bytes, got {}",
                TOPIC_KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(TopicKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; TOPIC_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TopicKey(<redacted>)")
    }
}
