//! AES-256-GCM sealing
//!
//! Wire format: `nonce (12) || ciphertext + tag`, base64 encoded for the
//! string helpers.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;

use super::{CryptoError, TopicKey};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Seal raw bytes under a 256-bit key
pub(crate) fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Malformed(format!("AEAD seal failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open bytes produced by [`seal`]
pub(crate) fn open(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Malformed("ciphertext too short".to_string()));
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Encrypt a UTF-8 string (e.g. a topic title) under the topic key
pub fn encrypt(key: &TopicKey, plaintext: &str) -> Result<String, CryptoError> {
    let sealed = seal(key.as_bytes(), plaintext.as_bytes())?;
    Ok(STANDARD.encode(sealed))
}

/// Decrypt a string produced by [`encrypt`]
pub fn decrypt(key: &TopicKey, ciphertext: &str) -> Result<String, CryptoError> {
    let data = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| CryptoError::Malformed(format!("invalid base64: {}", e)))?;
    let plaintext = open(key.as_bytes(), &data)?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::Malformed(format!("plaintext is not UTF-8: {}", e)))
}
